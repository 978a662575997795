//! # Skirmish Sim
//!
//! Headless host for the combat core:
//! - Scenario loading from RON
//! - Fixed-rate encounter runner
//! - End-of-run summary

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod scenario;
pub mod sim;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::scenario::*;
    pub use crate::sim::*;
}

pub use prelude::*;
