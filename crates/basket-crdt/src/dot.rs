//! Dots - unique identifiers of single update events

use std::fmt;

use basket_core::ReplicaId;
use serde::{Deserialize, Serialize};

/// One update event: the `seq`-th operation issued by `replica`.
///
/// Sequence numbers start at 1. A replica never issues the same `seq` twice.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Dot {
    pub replica: ReplicaId,
    pub seq: u64,
}

impl Dot {
    #[inline]
    pub fn new(replica: impl Into<ReplicaId>, seq: u64) -> Self {
        Dot {
            replica: replica.into(),
            seq,
        }
    }
}

impl fmt::Debug for Dot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dot({}:{})", self.replica, self.seq)
    }
}

impl fmt::Display for Dot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.replica, self.seq)
    }
}
