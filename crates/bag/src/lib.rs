//! Hash-consed, order-independent element sets.
//!
//! An [`InterningBag`] is an immutable, duplicate-free collection whose identity
//! is its content: every bag with the same elements, in any insertion order, is
//! the same allocation within its [`BagPool`]. Equality and hashing are therefore
//! pointer operations once a bag exists.
//!
//! # Invariants
//!
//! - A canonical bag is never mutated. Edits build a candidate buffer and
//!   canonicalize it through the pool.
//! - `with` on a present element and `without` on an absent element return the
//!   receiver itself without touching the intern table.
//! - The empty bag is a per-pool singleton that outlives every other bag.

mod bag;
mod pool;


pub use bag::{InterningBag, Iter};
pub use pool::{BagPool, PoolConfig, PoolStats};
