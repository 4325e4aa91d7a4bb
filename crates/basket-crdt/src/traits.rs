//! The capability set a CRDT needs to be nested inside an [`ORMap`](crate::ORMap)

use basket_core::ReplicaId;

use crate::SharedContext;

/// A delta-state CRDT that lives in a shared causal context.
///
/// `Clone` must produce an independent deep copy that owns a fresh context.
/// `PartialEq` compares observable state: the context value and the content,
/// never the replica id.
pub trait DeltaCrdt: Clone + PartialEq {
    /// The causal context this value records its dots in
    fn context(&self) -> &SharedContext;

    /// Rebind this value (and every nested part) to `context`
    fn set_context(&mut self, context: &SharedContext);

    /// A bottom value authored by `id`
    fn new_empty(id: &ReplicaId) -> Self;

    /// Merge `other` into `self`. Commutative, associative and idempotent.
    fn join(&mut self, other: &Self);

    /// Reset to bottom, returning the delta that carries the removal
    fn reset(&mut self) -> Self;

    /// Whether this value holds no live dots
    fn is_bottom(&self) -> bool;
}

/// `a ⊔ b` without touching either input
pub fn joined<T: DeltaCrdt>(a: &T, b: &T) -> T {
    let mut out = a.clone();
    out.join(b);
    out
}
