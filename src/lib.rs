//! Recommendation Memory
//!
//! A semantic memory for per-salesperson recommendations: it decides whether a
//! freshly generated recommendation is new enough to surface, remembers what
//! was accepted with a vector fingerprint, and frees targets when a
//! salesperson's pool is exhausted.
//!
//! # Modules
//!
//! - [`similarity`]: cosine similarity and threshold classification
//! - [`embedding`]: fingerprint providers
//! - [`persistence`]: the memory store contract and its providers
//! - [`generator`]: the recommendation generator contract and a chat-completions client
//! - [`engine`]: gate, reclaimer, per-subject pipeline and batch orchestrator
//! - [`source`]: subject data sources
//! - [`config`]: layered configuration

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]

pub mod config;
pub mod domain;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod generator;
pub mod persistence;
pub mod retry;
pub mod similarity;
pub mod source;
pub mod telemetry;

pub use error::{EngineError, ErrorDescriptor, ErrorKind};
