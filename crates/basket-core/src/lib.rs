//! Basket Core - Fundamental types shared by every Basket crate
//!
//! This crate defines:
//! - Identifiers (ReplicaId, NodeId)
//! - The crate-wide error type
//! - Ring and gossip configuration

pub mod config;
pub mod error;
pub mod id;

pub use config::*;
pub use error::*;
pub use id::*;
