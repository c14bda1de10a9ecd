//! Gantry CI Core
//!
//! Core domain types, traits, and error handling for Gantry CI.
//! This crate has minimal dependencies and defines the shared vocabulary
//! used across all other crates.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod job;
pub mod pipeline;
pub mod ports;
pub mod project;
pub mod status;
pub mod variables;

pub use error::{Error, Result};
pub use ids::*;
