//! Shopping list: items keyed by name in an observed-remove map

use basket_core::ReplicaId;
use serde::{Deserialize, Serialize};

use crate::{DeltaCrdt, ORMap, SharedContext, ShoppingItem};

/// Read-only snapshot of one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemView {
    pub name: String,
    pub quantity: i64,
    pub acquired: i64,
}

/// Collaboratively edited shopping list.
///
/// The name travels with every delta. Replicas created under different names
/// converge on the greater one, so a list built empty by a parent map picks up
/// its name from the first join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShoppingList {
    name: String,
    items: ORMap<String, ShoppingItem>,
}

impl ShoppingList {
    pub fn new(id: impl Into<ReplicaId>, name: impl Into<String>) -> Self {
        ShoppingList {
            name: name.into(),
            items: ORMap::new(id),
        }
    }

    pub fn id(&self) -> &ReplicaId {
        self.items.id()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add `quantity` units of `item`, creating it if needed
    pub fn add_item(&mut self, item: &str, quantity: i64) -> ShoppingList {
        let delta = self.items.apply(item.to_string(), |i| i.add_quantity(quantity));
        self.wrap(delta)
    }

    /// Set the wanted quantity of `item`
    pub fn change_quantity(&mut self, item: &str, quantity: i64) -> ShoppingList {
        let delta = self.items.apply(item.to_string(), |i| i.set_quantity(quantity));
        self.wrap(delta)
    }

    /// Record `amount` more units of `item` as bought
    pub fn acquire(&mut self, item: &str, amount: i64) -> ShoppingList {
        let delta = self.items.apply(item.to_string(), |i| i.acquire(amount));
        self.wrap(delta)
    }

    pub fn remove_item(&mut self, item: &str) -> ShoppingList {
        let delta = self.items.remove(&item.to_string());
        self.wrap(delta)
    }

    pub fn item(&self, item: &str) -> Option<ItemView> {
        self.items.value(&item.to_string()).map(|i| view(item, i))
    }

    /// Every live item in name order
    pub fn items(&self) -> Vec<ItemView> {
        self.items.iter().map(|(name, i)| view(name, i)).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn wrap(&self, items: ORMap<String, ShoppingItem>) -> ShoppingList {
        ShoppingList {
            name: self.name.clone(),
            items,
        }
    }
}

fn view(name: &str, item: &ShoppingItem) -> ItemView {
    ItemView {
        name: name.to_string(),
        quantity: item.quantity(),
        acquired: item.acquired(),
    }
}

impl PartialEq for ShoppingList {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.items == other.items
    }
}

impl DeltaCrdt for ShoppingList {
    fn context(&self) -> &SharedContext {
        self.items.context()
    }

    fn set_context(&mut self, context: &SharedContext) {
        self.items.set_context(context);
    }

    fn new_empty(id: &ReplicaId) -> Self {
        ShoppingList::new(id.clone(), "")
    }

    fn join(&mut self, other: &Self) {
        if other.name > self.name {
            self.name.clone_from(&other.name);
        }
        self.items.join(&other.items);
    }

    fn reset(&mut self) -> Self {
        let delta = self.items.reset();
        self.wrap(delta)
    }

    fn is_bottom(&self) -> bool {
        self.items.is_bottom()
    }
}
