//! Error types for Gantry CI.
//!
//! Illegal state transitions are deliberately NOT represented here: a
//! transition attempt that is not valid from the current state is an
//! expected race outcome and surfaces as `None`/`false` at the call site.

use crate::ids::{JobId, PipelineId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Lookup errors
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Pipeline not found: {0}")]
    PipelineNotFound(PipelineId),

    // Concurrency errors
    #[error("Optimistic lock conflict on {entity} {id}")]
    Conflict { entity: &'static str, id: String },

    #[error("Optimistic lock retries exhausted on {entity} {id} after {attempts} attempts")]
    ConflictRetriesExhausted {
        entity: &'static str,
        id: String,
        attempts: u32,
    },

    // Infrastructure errors
    #[error("Store error: {0}")]
    Store(String),

    #[error("Status cache error: {0}")]
    Cache(String),

    #[error("Notification dispatch error: {0}")]
    Notify(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether a caller holding a fresh copy of the row may retry.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
