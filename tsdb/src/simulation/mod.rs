//! Deterministic simulation testing infrastructure.
//!
//! This module provides tools for testing the tree without a real file:
//! - In-memory record storage with seeded fault injection
//! - Crash simulation (drop everything since the last commit)
//! - Invariant checking against a reference model
//!
//! Given the same seed, execution is identical.

mod invariants;
mod storage;

pub use invariants::check_against_model;
pub use storage::{FaultConfig, SimulatedStore};
