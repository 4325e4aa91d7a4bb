//! Basket CRDT - Delta-state replicated data types
//!
//! This crate implements the CRDT algebra:
//! - Dots and compact causal contexts
//! - The dot kernel merge engine
//! - Causal counters and enable-wins flags
//! - Observed-remove maps over nested CRDTs
//! - Shopping list domain types
//!
//! Every mutator updates local state and returns a minimal delta. Joining the
//! delta into any replica that already holds the pre-mutation state reproduces
//! the post-mutation state.
//!
//! Composite values share one causal context through [`SharedContext`], which
//! is reference counted and not thread safe. A replica is owned by a single
//! task; deltas cross threads in serialized form.

pub mod context;
pub mod counter;
pub mod dot;
pub mod flag;
pub mod kernel;
pub mod ormap;
pub mod shopping;
pub mod traits;

pub use context::*;
pub use counter::*;
pub use dot::*;
pub use flag::*;
pub use kernel::*;
pub use ormap::*;
pub use shopping::*;
pub use traits::*;
