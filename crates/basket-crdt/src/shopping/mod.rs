//! Shopping list CRDTs composed from counters and an observed-remove map

mod item;
mod list;

pub use item::ShoppingItem;
pub use list::{ItemView, ShoppingList};
