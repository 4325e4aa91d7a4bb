//! Causal contexts
//!
//! A [`DotContext`] records which dots a replica has observed. Each replica id
//! maps to a contiguous prefix `1..=base` plus a set of exceptions observed out
//! of order. Compaction folds exceptions into the base as soon as they become
//! contiguous, so a context stays proportional to the gaps, not to history.
//!
//! A [`SharedContext`] is the single causal scope an observed-remove map and all
//! of its nested values point at.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use basket_core::ReplicaId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::Dot;

/// Observed history of a single replica
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaHistory {
    /// Every seq in `1..=base` was observed
    pub base: u64,
    /// Seqs above `base + 1` observed out of order
    pub exceptions: BTreeSet<u64>,
}

impl ReplicaHistory {
    #[inline]
    fn contains(&self, seq: u64) -> bool {
        seq <= self.base || self.exceptions.contains(&seq)
    }

    fn compact(&mut self) {
        while self.exceptions.remove(&(self.base + 1)) {
            self.base += 1;
        }
        let base = self.base;
        self.exceptions.retain(|&seq| seq > base);
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.base == 0 && self.exceptions.is_empty()
    }
}

/// Compact causal history: the set of observed dots
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DotContext {
    histories: BTreeMap<ReplicaId, ReplicaHistory>,
}

impl DotContext {
    pub fn new() -> Self {
        DotContext::default()
    }

    /// Allocate the next dot for `replica` and mark it observed
    pub fn make_dot(&mut self, replica: &ReplicaId) -> Dot {
        let history = self.histories.entry(replica.clone()).or_default();
        history.compact();
        history.base += 1;
        let seq = history.base;
        history.compact();
        Dot::new(replica.clone(), seq)
    }

    /// Mark a dot observed, compacting immediately
    pub fn insert_dot(&mut self, dot: &Dot) {
        self.insert_dot_compact(dot, true);
    }

    /// Mark a dot observed.
    ///
    /// With `strict == false` the dot is parked as an exception and left for a
    /// later [`DotContext::compact`], which lets callers insert a batch of dots
    /// and compact once.
    pub fn insert_dot_compact(&mut self, dot: &Dot, strict: bool) {
        if dot.seq == 0 {
            return;
        }
        let history = self.histories.entry(dot.replica.clone()).or_default();
        if dot.seq <= history.base {
            return;
        }
        history.exceptions.insert(dot.seq);
        if strict {
            history.compact();
        }
    }

    /// Fold every contiguous exception into its base
    pub fn compact(&mut self) {
        for history in self.histories.values_mut() {
            history.compact();
        }
        self.histories.retain(|_, history| !history.is_empty());
    }

    /// Causal membership test
    pub fn contains(&self, dot: &Dot) -> bool {
        self.histories
            .get(&dot.replica)
            .map(|history| history.contains(dot.seq))
            .unwrap_or(false)
    }

    /// Join with another context (set union of observed dots)
    pub fn merge(&mut self, other: &DotContext) {
        for (replica, theirs) in &other.histories {
            let ours = self.histories.entry(replica.clone()).or_default();
            ours.base = ours.base.max(theirs.base);
            ours.exceptions.extend(theirs.exceptions.iter().copied());
            ours.compact();
        }
        self.histories.retain(|_, history| !history.is_empty());
    }

    /// Overwrite this context with `other` in place
    pub fn copy_from(&mut self, other: &DotContext) {
        self.histories.clone_from(&other.histories);
    }

    /// Highest contiguous seq observed from `replica`
    pub fn base(&self, replica: &ReplicaId) -> u64 {
        self.histories.get(replica).map(|h| h.base).unwrap_or(0)
    }

    pub fn history(&self, replica: &ReplicaId) -> Option<&ReplicaHistory> {
        self.histories.get(replica)
    }

    pub fn replicas(&self) -> impl Iterator<Item = &ReplicaId> {
        self.histories.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }
}

impl fmt::Display for DotContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Context: CC (")?;
        for (replica, history) in &self.histories {
            write!(f, " {}:{}", replica, history.base)?;
        }
        write!(f, " ) DC (")?;
        for (replica, history) in &self.histories {
            for seq in &history.exceptions {
                write!(f, " {}:{}", replica, seq)?;
            }
        }
        write!(f, " )")
    }
}

/// Handle to a causal context shared by a composite CRDT and its parts.
///
/// `Clone` is deliberately not implemented: use [`SharedContext::share`] to
/// alias the same context, or [`SharedContext::snapshot`] to copy its value.
#[derive(Default)]
pub struct SharedContext(Rc<RefCell<DotContext>>);

impl SharedContext {
    pub fn new() -> Self {
        SharedContext::default()
    }

    pub fn from_context(context: DotContext) -> Self {
        SharedContext(Rc::new(RefCell::new(context)))
    }

    /// Another handle onto the same context
    pub fn share(&self) -> Self {
        SharedContext(Rc::clone(&self.0))
    }

    pub fn is_shared_with(&self, other: &SharedContext) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn borrow(&self) -> Ref<'_, DotContext> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, DotContext> {
        self.0.borrow_mut()
    }

    /// Value copy of the current context
    pub fn snapshot(&self) -> DotContext {
        self.0.borrow().clone()
    }

    /// Put a previously taken snapshot back
    pub fn restore(&self, snapshot: &DotContext) {
        self.0.borrow_mut().copy_from(snapshot);
    }

    /// Merge `other` into this context. Merging a context with itself is a no-op.
    pub fn merge_from(&self, other: &SharedContext) {
        if self.is_shared_with(other) {
            return;
        }
        let theirs = other.borrow();
        self.0.borrow_mut().merge(&theirs);
    }
}

impl PartialEq for SharedContext {
    fn eq(&self, other: &Self) -> bool {
        self.is_shared_with(other) || *self.borrow() == *other.borrow()
    }
}

impl Eq for SharedContext {}

impl fmt::Debug for SharedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.borrow(), f)
    }
}

impl Serialize for SharedContext {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.borrow().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SharedContext {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        DotContext::deserialize(deserializer).map(SharedContext::from_context)
    }
}
