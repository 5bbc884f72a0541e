use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

use crate::ModifierId;

/// Capability set of a modifier.
///
/// `C` is the transient view of a target's current base state and `O` the
/// accumulator a recompute folds every active modifier into. Implementations
/// must be pure with respect to the store: any side effect on the target goes
/// through the output.
pub trait ModifierDefinition<C, O>: Send + Sync {
	/// Stable identifier. Must not change for the lifetime of the definition.
	fn id(&self) -> &ModifierId;

	/// Returns true if this modifier may be active on the target described by
	/// `ctx`. Called again whenever the target's modifier set changes, so it may
	/// depend on which other modifiers are present.
	fn can_apply(&self, ctx: &C) -> bool;

	/// Returns true if adding this modifier must remove `other` from the same
	/// target.
	fn should_evict(&self, other: &Modifier<C, O>) -> bool {
		let _ = other;
		false
	}

	/// Produces default instance data when a caller adds the modifier without
	/// explicit data.
	fn create_data(&self, ctx: &C) -> Option<String> {
		let _ = ctx;
		None
	}

	/// Returns false if `data` is not a payload this modifier can read.
	///
	/// Used to drop corrupt persisted entries on load.
	fn validate_data(&self, data: &str) -> bool {
		let _ = data;
		true
	}

	/// Folds this modifier's effect into `output`.
	fn apply(&self, ctx: &C, data: Option<&str>, output: &mut O);
}

/// Shared handle to a registered definition.
///
/// Identity is the definition's [`ModifierId`]: two handles compare equal when
/// their ids do, regardless of allocation.
pub struct Modifier<C, O> {
	def: Arc<dyn ModifierDefinition<C, O>>,
}

impl<C, O> Modifier<C, O> {
	pub fn new<D>(def: D) -> Self
	where
		D: ModifierDefinition<C, O> + 'static,
	{
		Self { def: Arc::new(def) }
	}

	pub fn from_arc(def: Arc<dyn ModifierDefinition<C, O>>) -> Self {
		Self { def }
	}

	pub fn id(&self) -> &ModifierId {
		self.def.id()
	}
}

impl<C, O> Deref for Modifier<C, O> {
	type Target = dyn ModifierDefinition<C, O>;

	fn deref(&self) -> &Self::Target {
		&*self.def
	}
}

impl<C, O> Clone for Modifier<C, O> {
	fn clone(&self) -> Self {
		Self {
			def: self.def.clone(),
		}
	}
}

impl<C, O> PartialEq for Modifier<C, O> {
	fn eq(&self, other: &Self) -> bool {
		self.id() == other.id()
	}
}

impl<C, O> Eq for Modifier<C, O> {}

impl<C, O> Hash for Modifier<C, O> {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.id().hash(state);
	}
}

impl<C, O> fmt::Debug for Modifier<C, O> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Modifier").field(&self.id().as_str()).finish()
	}
}
