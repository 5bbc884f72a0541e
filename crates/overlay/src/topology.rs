//! Contract between the store and a concrete target hierarchy.

use std::fmt::Debug;
use std::hash::Hash;

use lamina_bag::InterningBag;
use lamina_registry::Modifier;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Modifier handle for a topology's context and output types.
pub type ModifierOf<T> = Modifier<<T as Topology>::Context, <T as Topology>::Output>;

/// Canonical modifier set for a topology.
pub type ModifierBag<T> = InterningBag<ModifierOf<T>>;

/// Hooks a concrete target hierarchy supplies to an [`OverlayStore`].
///
/// The store never inspects keys beyond equality and hashing; every structural
/// question goes through this trait. None of these methods are called while the
/// store holds its own lock, so implementations may be arbitrarily expensive.
///
/// [`OverlayStore`]: crate::OverlayStore
pub trait Topology: Send + Sync {
	/// Runtime address of a modifiable target.
	type Key: Clone + Eq + Hash + Debug + Send + Sync;
	/// Persistable form of [`Topology::Key`], used on the wire and on disk.
	type PersistedKey: Clone + Eq + Hash + Debug + Serialize + DeserializeOwned + Send + Sync;
	/// Transient view of a target's current base state.
	type Context;
	/// Accumulator modifiers fold their effects into.
	type Output;

	/// Returns the parent of `key`, if the addressing scheme has one.
	fn try_get_parent(&self, key: &Self::Key) -> Option<Self::Key>;

	/// Appends every direct child of `key` to `out`.
	fn get_children(&self, key: &Self::Key, out: &mut Vec<Self::Key>);

	/// Builds the context for `key` as if `modifiers` were its active set.
	///
	/// Returns `None` when the target no longer exists or cannot be addressed.
	fn try_create_context(
		&self,
		key: &Self::Key,
		modifiers: &InterningBag<Modifier<Self::Context, Self::Output>>,
	) -> Option<Self::Context>;

	/// Starts a fresh output from the target's base state.
	fn create_output(&self, key: &Self::Key, ctx: &Self::Context) -> Self::Output;

	/// Writes a folded output back to the target. Must tolerate being called
	/// repeatedly with equivalent inputs.
	fn apply_output(&self, key: &Self::Key, ctx: &Self::Context, output: Self::Output);

	fn persist_key(&self, key: &Self::Key) -> Self::PersistedKey;

	/// Maps a persisted key back to a live key. `None` drops the entry.
	fn resolve_key(&self, key: &Self::PersistedKey) -> Option<Self::Key>;
}
