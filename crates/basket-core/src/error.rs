//! Error types for Basket
//!
//! The CRDT algebra is total and never fails. Errors only come from the edges:
//! configuration, the gossip transport and the snapshot codec.

use thiserror::Error;

use crate::NodeId;

/// Core Basket errors
#[derive(Error, Debug)]
pub enum BasketError {
    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Gossip errors
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unknown peer: {0}")]
    UnknownPeer(NodeId),

    // Serialization boundary
    #[error("Codec error: {0}")]
    Codec(String),
}

/// Result type for Basket operations
pub type BasketResult<T> = Result<T, BasketError>;
