//! Recommendation deduplication engine.
//!
//! [`BatchOrchestrator`] drives a [`SubjectPipeline`] per subject; the pipeline
//! runs the [`Reclaimer`] before generation and the [`Gate`] on every candidate.

pub mod batch;
pub mod gate;
pub mod pipeline;
pub mod reclaimer;

pub use batch::{BatchOrchestrator, partition};
pub use gate::{Gate, GateDecision, GateOutcome, evaluate};
pub use pipeline::SubjectPipeline;
pub use reclaimer::Reclaimer;
