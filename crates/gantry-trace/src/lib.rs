//! Build log storage for Gantry CI.
//!
//! One growable append-only log per job, addressed by byte offset so runner
//! uploads stay resumable and idempotent. Every write path passes through
//! the secret masker before bytes reach disk.

pub mod coverage;
pub mod masker;
pub mod store;

pub use coverage::extract_coverage;
pub use masker::SecretMasker;
pub use store::{TraceError, TraceStore};
