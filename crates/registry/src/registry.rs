//! Runtime modifier registry with atomic publication.
//!
//! # Role
//!
//! Resolves [`ModifierId`]s arriving from the wire or from persisted state to
//! shared [`Modifier`] handles. Reads load the current snapshot without locking;
//! registration publishes a new snapshot through a compare-and-swap loop.
//!
//! # Invariants
//!
//! - A handle obtained from [`ModifierRegistry::get`] stays valid after the
//!   definition is replaced or the registry is dropped.
//! - Concurrent registrations are linearizable: no registration is lost.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::{Modifier, ModifierId};

/// What to do when a definition is registered under an id that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
	/// Keep the existing definition and reject the new one.
	#[default]
	FirstWins,
	/// Replace the existing definition.
	LastWins,
}

/// Registration failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegisterError {
	/// The id is already taken and the policy kept the existing definition.
	#[error("duplicate modifier id {id} in registry {label}")]
	Duplicate { label: &'static str, id: ModifierId },
}

type Table<C, O> = FxHashMap<ModifierId, Modifier<C, O>>;

/// Id-indexed table of modifier definitions.
pub struct ModifierRegistry<C, O> {
	label: &'static str,
	snap: ArcSwap<Table<C, O>>,
	policy: DuplicatePolicy,
}

impl<C, O> fmt::Debug for ModifierRegistry<C, O> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ModifierRegistry")
			.field("label", &self.label)
			.field("len", &self.len())
			.field("policy", &self.policy)
			.finish()
	}
}

impl<C, O> ModifierRegistry<C, O> {
	/// Creates an empty registry that rejects duplicate ids.
	pub fn new(label: &'static str) -> Self {
		Self::with_policy(label, DuplicatePolicy::default())
	}

	/// Creates an empty registry with the given duplicate policy.
	pub fn with_policy(label: &'static str, policy: DuplicatePolicy) -> Self {
		Self {
			label,
			snap: ArcSwap::from_pointee(FxHashMap::default()),
			policy,
		}
	}

	pub fn label(&self) -> &'static str {
		self.label
	}

	/// Looks up a definition by id.
	#[inline]
	pub fn get(&self, id: &str) -> Option<Modifier<C, O>> {
		self.snap.load().get(id).cloned()
	}

	pub fn contains(&self, id: &str) -> bool {
		self.snap.load().contains_key(id)
	}

	pub fn len(&self) -> usize {
		self.snap.load().len()
	}

	pub fn is_empty(&self) -> bool {
		self.snap.load().is_empty()
	}

	/// Returns every registered definition, sorted by id.
	pub fn all(&self) -> Vec<Modifier<C, O>> {
		let snap = self.snap.load();
		let mut all: Vec<_> = snap.values().cloned().collect();
		all.sort_by(|a, b| a.id().cmp(b.id()));
		all
	}

	/// Registers a definition, honoring the duplicate policy.
	pub fn register(&self, modifier: Modifier<C, O>) -> Result<Modifier<C, O>, RegisterError> {
		loop {
			let old = self.snap.load_full();
			let id = modifier.id().clone();

			if old.contains_key(&id) && self.policy == DuplicatePolicy::FirstWins {
				return Err(RegisterError::Duplicate {
					label: self.label,
					id,
				});
			}

			let mut table = (*old).clone();
			let replaced = table.insert(id.clone(), modifier.clone()).is_some();
			let new = Arc::new(table);

			let prev = self.snap.compare_and_swap(&old, new);
			if Arc::ptr_eq(&prev, &old) {
				debug!(registry = self.label, %id, replaced, "registered modifier");
				return Ok(modifier);
			}
			// Lost the race; retry against the fresh snapshot.
		}
	}

	/// Registers several definitions, stopping at the first rejection.
	pub fn register_all<I>(&self, modifiers: I) -> Result<(), RegisterError>
	where
		I: IntoIterator<Item = Modifier<C, O>>,
	{
		for modifier in modifiers {
			self.register(modifier)?;
		}
		Ok(())
	}

	/// Removes a definition. Existing handles stay usable.
	pub fn unregister(&self, id: &str) -> Option<Modifier<C, O>> {
		loop {
			let old = self.snap.load_full();
			let removed = old.get(id).cloned()?;
			let mut table = (*old).clone();
			table.remove(id);
			let prev = self.snap.compare_and_swap(&old, Arc::new(table));
			if Arc::ptr_eq(&prev, &old) {
				debug!(registry = self.label, id, "unregistered modifier");
				return Some(removed);
			}
		}
	}
}
