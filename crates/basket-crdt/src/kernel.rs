//! Dot kernel - the generic merge engine behind every concrete CRDT
//!
//! A kernel stores values indexed by the dot that created them, together with a
//! causal context. A dot that is in the context but not in the value map has
//! been removed; a dot in neither has simply not been seen yet. That
//! distinction is what lets [`DotKernel::merge`] tell a removal from an
//! unknown write.

use std::collections::BTreeMap;

use basket_core::ReplicaId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Dot, DotContext, SharedContext};

/// Dot-indexed value store with a (possibly shared) causal context
#[derive(Debug)]
pub struct DotKernel<V> {
    values: BTreeMap<Dot, V>,
    context: SharedContext,
}

impl<V> Default for DotKernel<V> {
    fn default() -> Self {
        DotKernel {
            values: BTreeMap::new(),
            context: SharedContext::new(),
        }
    }
}

impl<V: Clone + PartialEq> DotKernel<V> {
    pub fn new() -> Self {
        DotKernel::default()
    }

    /// Empty kernel bound to an existing context
    pub fn with_context(context: &SharedContext) -> Self {
        DotKernel {
            values: BTreeMap::new(),
            context: context.share(),
        }
    }

    pub fn context(&self) -> &SharedContext {
        &self.context
    }

    pub fn set_context(&mut self, context: &SharedContext) {
        self.context = context.share();
    }

    pub fn values(&self) -> impl Iterator<Item = (&Dot, &V)> {
        self.values.iter()
    }

    pub fn dots(&self) -> impl Iterator<Item = &Dot> {
        self.values.keys()
    }

    pub fn get(&self, dot: &Dot) -> Option<&V> {
        self.values.get(dot)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Store `value` under a fresh dot without producing a delta
    pub fn dot_add(&mut self, replica: &ReplicaId, value: V) -> Dot {
        let dot = self.context.borrow_mut().make_dot(replica);
        self.values.insert(dot.clone(), value);
        dot
    }

    /// Store `value` under a fresh dot; the delta carries only that pair
    pub fn add(&mut self, replica: &ReplicaId, value: V) -> DotKernel<V> {
        let dot = self.dot_add(replica, value.clone());

        let mut delta = DotKernel::new();
        delta.context.borrow_mut().insert_dot(&dot);
        delta.values.insert(dot, value);
        delta
    }

    /// Remove one dot. The delta carries the dot in its context and no value.
    pub fn remove_dot(&mut self, dot: &Dot) -> DotKernel<V> {
        let delta = DotKernel::new();
        if self.values.remove(dot).is_some() {
            delta.context.borrow_mut().insert_dot(dot);
        }
        delta
    }

    /// Remove every dot holding a value equal to `value`
    pub fn remove_value(&mut self, value: &V) -> DotKernel<V> {
        let delta = DotKernel::new();
        {
            let mut tombstones = delta.context.borrow_mut();
            self.values.retain(|dot, held| {
                if *held == *value {
                    tombstones.insert_dot_compact(dot, false);
                    false
                } else {
                    true
                }
            });
            tombstones.compact();
        }
        delta
    }

    /// Drop every value. The delta's context covers all dropped dots.
    pub fn reset(&mut self) -> DotKernel<V> {
        let delta = DotKernel::new();
        {
            let mut tombstones = delta.context.borrow_mut();
            for dot in self.values.keys() {
                tombstones.insert_dot_compact(dot, false);
            }
            tombstones.compact();
        }
        self.values.clear();
        delta
    }

    /// Join `other` into this kernel.
    ///
    /// A local dot is dropped when `other` has observed it but no longer holds
    /// it. A remote dot is adopted unless this side has already observed it.
    pub fn merge(&mut self, other: &DotKernel<V>) {
        {
            let theirs = other.context.borrow();
            self.values
                .retain(|dot, _| other.values.contains_key(dot) || !theirs.contains(dot));
        }
        {
            let ours = self.context.borrow();
            for (dot, value) in &other.values {
                if !self.values.contains_key(dot) && !ours.contains(dot) {
                    self.values.insert(dot.clone(), value.clone());
                }
            }
        }
        self.context.merge_from(&other.context);
    }
}

/// Deep copy: the clone owns a fresh copy of the context
impl<V: Clone> Clone for DotKernel<V> {
    fn clone(&self) -> Self {
        DotKernel {
            values: self.values.clone(),
            context: SharedContext::from_context(self.context.snapshot()),
        }
    }
}

impl<V: PartialEq> PartialEq for DotKernel<V> {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values && self.context == other.context
    }
}

#[derive(Serialize)]
struct KernelRef<'a, V> {
    values: Vec<(&'a Dot, &'a V)>,
    context: &'a DotContext,
}

#[derive(Deserialize)]
struct KernelRepr<V> {
    values: Vec<(Dot, V)>,
    context: DotContext,
}

impl<V: Serialize> Serialize for DotKernel<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let context = self.context.borrow();
        KernelRef {
            values: self.values.iter().collect(),
            context: &context,
        }
        .serialize(serializer)
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for DotKernel<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let KernelRepr {
            values,
            mut context,
        } = KernelRepr::deserialize(deserializer)?;
        // a stored value is always an observed dot
        for (dot, _) in &values {
            context.insert_dot(dot);
        }
        Ok(DotKernel {
            values: values.into_iter().collect(),
            context: SharedContext::from_context(context),
        })
    }
}
