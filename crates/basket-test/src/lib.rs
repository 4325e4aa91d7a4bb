//! Basket Test Harness - Convergence and membership simulation
//!
//! This crate provides:
//! - A replica convergence simulator over a chaotic delivery channel
//! - An in-memory gossip cluster with injectable peer failures
//! - Log capture for tests

pub mod cluster;
pub mod convergence;
pub mod logging;

pub use cluster::*;
pub use convergence::*;
pub use logging::*;
