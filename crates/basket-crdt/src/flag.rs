//! Enable-wins flag

use basket_core::ReplicaId;
use serde::{Deserialize, Serialize};

use crate::{DeltaCrdt, DotKernel, SharedContext};

/// Boolean flag where a concurrent enable beats a disable
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EWFlag {
    id: ReplicaId,
    kernel: DotKernel<bool>,
}

impl EWFlag {
    pub fn new(id: impl Into<ReplicaId>) -> Self {
        EWFlag {
            id: id.into(),
            kernel: DotKernel::new(),
        }
    }

    pub fn from_kernel(id: impl Into<ReplicaId>, kernel: DotKernel<bool>) -> Self {
        EWFlag {
            id: id.into(),
            kernel,
        }
    }

    pub fn id(&self) -> &ReplicaId {
        &self.id
    }

    /// Replace every observed enable with a single fresh one
    pub fn enable(&mut self) -> EWFlag {
        let mut kernel = self.kernel.reset();
        kernel.merge(&self.kernel.add(&self.id, true));
        self.delta(kernel)
    }

    pub fn disable(&mut self) -> EWFlag {
        let kernel = self.kernel.reset();
        self.delta(kernel)
    }

    pub fn read(&self) -> bool {
        !self.kernel.is_empty()
    }

    fn delta(&self, kernel: DotKernel<bool>) -> EWFlag {
        EWFlag {
            id: self.id.clone(),
            kernel,
        }
    }
}

impl PartialEq for EWFlag {
    fn eq(&self, other: &Self) -> bool {
        self.kernel == other.kernel
    }
}

impl DeltaCrdt for EWFlag {
    fn context(&self) -> &SharedContext {
        self.kernel.context()
    }

    fn set_context(&mut self, context: &SharedContext) {
        self.kernel.set_context(context);
    }

    fn new_empty(id: &ReplicaId) -> Self {
        EWFlag::new(id.clone())
    }

    fn join(&mut self, other: &Self) {
        self.kernel.merge(&other.kernel);
    }

    fn reset(&mut self) -> Self {
        self.disable()
    }

    fn is_bottom(&self) -> bool {
        self.kernel.is_empty()
    }
}
