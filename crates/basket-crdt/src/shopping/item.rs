//! A single shopping list entry: wanted quantity and acquired count

use basket_core::ReplicaId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{CCounter, DeltaCrdt, DotContext, SharedContext};

/// Two causal counters living in one context
#[derive(Debug)]
pub struct ShoppingItem {
    id: ReplicaId,
    context: SharedContext,
    quantity: CCounter,
    acquired: CCounter,
}

impl ShoppingItem {
    pub fn new(id: impl Into<ReplicaId>) -> Self {
        let id = id.into();
        let context = SharedContext::new();
        let mut quantity = CCounter::new(id.clone());
        let mut acquired = CCounter::new(id.clone());
        quantity.set_context(&context);
        acquired.set_context(&context);
        ShoppingItem {
            id,
            context,
            quantity,
            acquired,
        }
    }

    pub fn id(&self) -> &ReplicaId {
        &self.id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity.read()
    }

    pub fn acquired(&self) -> i64 {
        self.acquired.read()
    }

    /// Units still to buy, never negative
    pub fn remaining(&self) -> i64 {
        self.quantity().saturating_sub(self.acquired()).max(0)
    }

    pub fn add_quantity(&mut self, amount: i64) -> ShoppingItem {
        let delta = self.quantity.inc(amount);
        self.wrap(Some(delta), None)
    }

    /// Move the wanted quantity to `target` relative to what this replica sees
    pub fn set_quantity(&mut self, target: i64) -> ShoppingItem {
        // the counter wraps, so adding the wrapped difference lands on target
        let diff = target.wrapping_sub(self.quantity());
        let delta = self.quantity.inc(diff);
        self.wrap(Some(delta), None)
    }

    pub fn acquire(&mut self, amount: i64) -> ShoppingItem {
        let delta = self.acquired.inc(amount);
        self.wrap(None, Some(delta))
    }

    /// Package counter deltas into an item delta bound to its own context
    fn wrap(&self, quantity: Option<CCounter>, acquired: Option<CCounter>) -> ShoppingItem {
        let mut delta = ShoppingItem::new(self.id.clone());
        if let Some(mut quantity) = quantity {
            delta.context.merge_from(quantity.context());
            quantity.set_context(&delta.context);
            delta.quantity = quantity;
        }
        if let Some(mut acquired) = acquired {
            delta.context.merge_from(acquired.context());
            acquired.set_context(&delta.context);
            delta.acquired = acquired;
        }
        delta
    }
}

impl Clone for ShoppingItem {
    fn clone(&self) -> Self {
        let context = SharedContext::from_context(self.context.snapshot());
        let mut quantity = self.quantity.clone();
        let mut acquired = self.acquired.clone();
        quantity.set_context(&context);
        acquired.set_context(&context);
        ShoppingItem {
            id: self.id.clone(),
            context,
            quantity,
            acquired,
        }
    }
}

impl PartialEq for ShoppingItem {
    fn eq(&self, other: &Self) -> bool {
        self.context == other.context
            && self.quantity == other.quantity
            && self.acquired == other.acquired
    }
}

#[derive(Serialize)]
struct ItemRef<'a> {
    id: &'a ReplicaId,
    quantity: &'a CCounter,
    acquired: &'a CCounter,
    context: &'a DotContext,
}

#[derive(Deserialize)]
struct ItemRepr {
    id: ReplicaId,
    quantity: CCounter,
    acquired: CCounter,
    context: DotContext,
}

impl Serialize for ShoppingItem {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let context = self.context.borrow();
        ItemRef {
            id: &self.id,
            quantity: &self.quantity,
            acquired: &self.acquired,
            context: &context,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ShoppingItem {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let ItemRepr {
            id,
            mut quantity,
            mut acquired,
            context,
        } = ItemRepr::deserialize(deserializer)?;
        let context = SharedContext::from_context(context);
        context.merge_from(quantity.context());
        context.merge_from(acquired.context());
        quantity.set_context(&context);
        acquired.set_context(&context);
        Ok(ShoppingItem {
            id,
            context,
            quantity,
            acquired,
        })
    }
}

impl DeltaCrdt for ShoppingItem {
    fn context(&self) -> &SharedContext {
        &self.context
    }

    fn set_context(&mut self, context: &SharedContext) {
        self.context = context.share();
        self.quantity.set_context(context);
        self.acquired.set_context(context);
    }

    fn new_empty(id: &ReplicaId) -> Self {
        ShoppingItem::new(id.clone())
    }

    fn join(&mut self, other: &Self) {
        let snapshot = self.context.snapshot();
        self.quantity.join(&other.quantity);
        self.context.restore(&snapshot);
        self.acquired.join(&other.acquired);
        self.context.restore(&snapshot);
        self.context.merge_from(&other.context);
    }

    fn reset(&mut self) -> Self {
        let delta = ShoppingItem::new(self.id.clone());
        let quantity = self.quantity.reset();
        let acquired = self.acquired.reset();
        delta.context.merge_from(quantity.context());
        delta.context.merge_from(acquired.context());
        delta
    }

    fn is_bottom(&self) -> bool {
        self.quantity.is_bottom() && self.acquired.is_bottom()
    }
}
