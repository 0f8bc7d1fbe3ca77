//! Data model of the recommendation memory engine.
//!
//! - [`Subject`] and [`Target`] are read-only inputs from the data source.
//! - [`CandidateRecommendation`] lives for one pipeline pass.
//! - [`MemoryRecord`] is the persisted unit owned by the memory store.
//! - [`outcome`] holds what the engine reports upward.

pub mod memory;
pub mod outcome;
pub mod recommendation;
pub mod subject;

pub use memory::{MemoryRecord, MemoryStatus, NewMemoryRecord};
pub use outcome::{
    AcceptedRecommendation, BatchPhase, BatchReport, BatchSummary, ReclaimAction, ReclaimReport,
    RejectReason, Rejection, SubjectResult,
};
pub use recommendation::{CandidateRecommendation, Origin, Priority};
pub use subject::{PickupStats, RiskLevel, Subject, Target, TargetMetrics};
