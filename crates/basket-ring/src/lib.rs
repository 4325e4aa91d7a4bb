//! Basket Ring - Partition and membership view
//!
//! This crate implements:
//! - SHA-1 token hashing
//! - The consistent-hashing ring view
//! - Epidemic join gossip over a pluggable transport
//!
//! The ring is the only internally locked component in Basket. Every method on
//! [`RingView`] takes `&self` and is safe to call from concurrent tasks.

pub mod gossip;
pub mod hash;
pub mod ring;

pub use gossip::*;
pub use hash::*;
pub use ring::*;
