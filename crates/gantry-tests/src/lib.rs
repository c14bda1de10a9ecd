//! Integration test infrastructure for Gantry CI.
//!
//! Fixtures build realistic projects, configurations, and runners; the
//! helper context wires every crate together over the in-memory store the
//! way a deployment wires them over the relational one.

pub mod fixtures;
pub mod helpers;

pub use fixtures::{ConfigFixture, ProjectFixture, RunnerFixture};
pub use helpers::TestContext;
