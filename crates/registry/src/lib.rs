//! Modifier definitions and their runtime registry.
//!
//! A modifier is a shared, immutable transformation that may be layered onto a
//! target. This crate knows nothing about targets: definitions are generic over
//! the context type `C` they inspect and the output type `O` they fold into.
//!
//! - [`ModifierId`] - stable, cheaply cloned identifier used on the wire and in
//!   persisted state
//! - [`ModifierDefinition`] - the capability set every modifier implements
//! - [`Modifier`] - shared handle whose identity is its id
//! - [`ModifierRegistry`] - lock-free lookup table with atomic publication

mod definition;
mod id;
mod registry;

#[cfg(test)]
mod tests;

pub use definition::{Modifier, ModifierDefinition};
pub use id::ModifierId;
pub use registry::{DuplicatePolicy, ModifierRegistry, RegisterError};
