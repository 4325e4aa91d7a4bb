//! Causal counter
//!
//! Every increment is stored under its own dot, so concurrent increments from
//! different replicas are kept side by side and summed on read. Arithmetic
//! wraps on overflow, so every operation is total over `i64`.

use basket_core::ReplicaId;
use serde::{Deserialize, Serialize};

use crate::{DeltaCrdt, DotKernel, SharedContext};

/// Counter supporting increment, decrement and observed reset
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CCounter {
    id: ReplicaId,
    kernel: DotKernel<i64>,
}

impl CCounter {
    pub fn new(id: impl Into<ReplicaId>) -> Self {
        CCounter {
            id: id.into(),
            kernel: DotKernel::new(),
        }
    }

    /// Rebuild a counter from a decoded kernel
    pub fn from_kernel(id: impl Into<ReplicaId>, kernel: DotKernel<i64>) -> Self {
        CCounter {
            id: id.into(),
            kernel,
        }
    }

    pub fn id(&self) -> &ReplicaId {
        &self.id
    }

    pub fn kernel(&self) -> &DotKernel<i64> {
        &self.kernel
    }

    pub fn inc(&mut self, amount: i64) -> CCounter {
        let kernel = self.kernel.add(&self.id, amount);
        self.delta(kernel)
    }

    pub fn dec(&mut self, amount: i64) -> CCounter {
        let kernel = self.kernel.add(&self.id, amount.wrapping_neg());
        self.delta(kernel)
    }

    pub fn read(&self) -> i64 {
        self.kernel.values().fold(0i64, |sum, (_, v)| sum.wrapping_add(*v))
    }

    fn delta(&self, kernel: DotKernel<i64>) -> CCounter {
        CCounter {
            id: self.id.clone(),
            kernel,
        }
    }
}

impl PartialEq for CCounter {
    fn eq(&self, other: &Self) -> bool {
        self.kernel == other.kernel
    }
}

impl DeltaCrdt for CCounter {
    fn context(&self) -> &SharedContext {
        self.kernel.context()
    }

    fn set_context(&mut self, context: &SharedContext) {
        self.kernel.set_context(context);
    }

    fn new_empty(id: &ReplicaId) -> Self {
        CCounter::new(id.clone())
    }

    fn join(&mut self, other: &Self) {
        self.kernel.merge(&other.kernel);
    }

    fn reset(&mut self) -> Self {
        let kernel = self.kernel.reset();
        self.delta(kernel)
    }

    fn is_bottom(&self) -> bool {
        self.kernel.is_empty()
    }
}
