//! Artifact lifecycle for Gantry CI: expiry, erasure, size accounting.

pub mod lifecycle;
pub mod store;

pub use lifecycle::ArtifactLifecycle;
pub use store::{ArtifactStore, FsArtifactStore};
