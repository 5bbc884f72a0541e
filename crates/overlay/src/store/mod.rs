//! The modifier overlay store.
//!
//! # Role
//!
//! Owns the two maps that describe overlay state: the canonical modifier set
//! of every target that has one, and the opaque instance data of individual
//! modifiers on those targets. Both maps sit behind a single lock and are
//! always edited together.
//!
//! # Invariants
//!
//! - A key is present in the set map only with a non-empty bag.
//! - A data entry exists only for a modifier present in its key's bag.
//! - Every bag in the set map was produced by the store's own pool.
//! - Collaborator callbacks never run while the lock is held.

mod migrate;
mod mutate;
mod recompute;


use std::cell::Cell;
use std::sync::Arc;
use std::time::Instant;

use lamina_bag::BagPool;
use lamina_registry::{ModifierId, ModifierRegistry};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::{OverlayConfig, StoreConfig};
use crate::replication::{DenyRemote, Offline, PeerId, Role, Transport, TrustPolicy};
use crate::topology::{ModifierBag, ModifierOf, Topology};

pub(crate) use mutate::ApplyMode;

type Listener<K> = Arc<dyn Fn(&K) + Send + Sync>;

/// Instance data of the modifiers on one key.
pub(crate) type KeyData = FxHashMap<ModifierId, String>;

pub(crate) struct OverlayState<T: Topology> {
	pub(crate) sets: FxHashMap<T::Key, ModifierBag<T>>,
	pub(crate) data: FxHashMap<T::Key, KeyData>,
}

impl<T: Topology> Default for OverlayState<T> {
	fn default() -> Self {
		Self {
			sets: FxHashMap::default(),
			data: FxHashMap::default(),
		}
	}
}

impl<T: Topology> OverlayState<T> {
	/// Removes a data entry, dropping the key's data map once empty.
	pub(crate) fn remove_data(&mut self, key: &T::Key, id: &ModifierId) {
		if let Some(entries) = self.data.get_mut(key) {
			entries.remove(id);
			if entries.is_empty() {
				self.data.remove(key);
			}
		}
	}

	/// Sets or clears a data entry. Empty payloads clear.
	pub(crate) fn put_data(&mut self, key: &T::Key, id: ModifierId, payload: String) {
		if payload.is_empty() {
			self.remove_data(key, &id);
		} else {
			self.data.entry(key.clone()).or_default().insert(id, payload);
		}
	}
}

/// Counters describing the store's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OverlayStats {
	/// Targets with at least one modifier.
	pub keys: usize,
	/// Distinct canonical sets referenced by those targets.
	pub distinct_sets: usize,
	/// Stored instance data entries.
	pub data_entries: usize,
}

/// Per-target modifier sets and instance data over a [`Topology`].
///
/// Thread-safe; share it via `Arc<OverlayStore<T>>`.
pub struct OverlayStore<T: Topology> {
	topology: T,
	registry: Arc<ModifierRegistry<T::Context, T::Output>>,
	pool: BagPool<ModifierOf<T>>,
	pub(crate) state: RwLock<OverlayState<T>>,
	/// Serializes recompute walks; the flag is set while one is running.
	recomputing: ReentrantMutex<Cell<bool>>,
	listeners: RwLock<Vec<Listener<T::Key>>>,
	role: Role,
	authority: Option<PeerId>,
	transport: Arc<dyn Transport<T::PersistedKey>>,
	trust: Arc<dyn TrustPolicy<T::Key>>,
	config: StoreConfig,
	last_gc: Mutex<Option<Instant>>,
}

/// Builder for [`OverlayStore`].
pub struct OverlayStoreBuilder<T: Topology> {
	topology: T,
	registry: Arc<ModifierRegistry<T::Context, T::Output>>,
	pool: Option<BagPool<ModifierOf<T>>>,
	config: OverlayConfig,
	role: Role,
	authority: Option<PeerId>,
	transport: Arc<dyn Transport<T::PersistedKey>>,
	trust: Arc<dyn TrustPolicy<T::Key>>,
}

impl<T: Topology> OverlayStoreBuilder<T> {
	/// Shares an existing bag pool instead of creating one from config.
	///
	/// Stores that share a pool can exchange bags during migration without
	/// re-interning.
	pub fn pool(mut self, pool: BagPool<ModifierOf<T>>) -> Self {
		self.pool = Some(pool);
		self
	}

	pub fn config(mut self, config: OverlayConfig) -> Self {
		self.config = config;
		self
	}

	pub fn role(mut self, role: Role) -> Self {
		self.role = role;
		self
	}

	/// Peer whose calls a mirror follows. Calls from anyone else are refused
	/// as untrusted. Unset, a mirror follows every sender.
	pub fn authority(mut self, peer: PeerId) -> Self {
		self.authority = Some(peer);
		self
	}

	pub fn transport(mut self, transport: Arc<dyn Transport<T::PersistedKey>>) -> Self {
		self.transport = transport;
		self
	}

	pub fn trust(mut self, trust: Arc<dyn TrustPolicy<T::Key>>) -> Self {
		self.trust = trust;
		self
	}

	pub fn build(self) -> OverlayStore<T> {
		let pool = self
			.pool
			.unwrap_or_else(|| BagPool::with_config(self.config.pool));
		OverlayStore {
			topology: self.topology,
			registry: self.registry,
			pool,
			state: RwLock::new(OverlayState::default()),
			recomputing: ReentrantMutex::new(Cell::new(false)),
			listeners: RwLock::new(Vec::new()),
			role: self.role,
			authority: self.authority,
			transport: self.transport,
			trust: self.trust,
			config: self.config.store,
			last_gc: Mutex::new(None),
		}
	}
}

impl<T: Topology> OverlayStore<T> {
	/// Starts building a store. Defaults: authority role, offline transport,
	/// no remote peer trusted, default configuration.
	pub fn builder(
		topology: T,
		registry: Arc<ModifierRegistry<T::Context, T::Output>>,
	) -> OverlayStoreBuilder<T> {
		OverlayStoreBuilder {
			topology,
			registry,
			pool: None,
			config: OverlayConfig::default(),
			role: Role::default(),
			authority: None,
			transport: Arc::new(Offline),
			trust: Arc::new(DenyRemote),
		}
	}

	pub fn topology(&self) -> &T {
		&self.topology
	}

	pub fn registry(&self) -> &ModifierRegistry<T::Context, T::Output> {
		&self.registry
	}

	pub fn pool(&self) -> &BagPool<ModifierOf<T>> {
		&self.pool
	}

	pub fn role(&self) -> Role {
		self.role
	}

	pub(crate) fn authority(&self) -> Option<PeerId> {
		self.authority
	}

	pub(crate) fn transport(&self) -> &dyn Transport<T::PersistedKey> {
		&*self.transport
	}

	pub(crate) fn trust(&self) -> &dyn TrustPolicy<T::Key> {
		&*self.trust
	}

	/// Returns the modifiers active on `key`; the empty bag if none.
	pub fn get_modifiers(&self, key: &T::Key) -> ModifierBag<T> {
		self.state
			.read()
			.sets
			.get(key)
			.cloned()
			.unwrap_or_else(|| self.pool.empty())
	}

	/// Returns true if `modifier` is active on `key`.
	pub fn has_modifier(&self, key: &T::Key, modifier: &ModifierOf<T>) -> bool {
		self.state
			.read()
			.sets
			.get(key)
			.is_some_and(|set| set.contains(modifier))
	}

	/// Returns the instance data of `modifier` on `key`, if any.
	pub fn get_data(&self, key: &T::Key, modifier: &ModifierId) -> Option<String> {
		self.state.read().data.get(key)?.get(modifier).cloned()
	}

	/// Returns every key that currently has modifiers.
	pub fn keys(&self) -> Vec<T::Key> {
		self.state.read().sets.keys().cloned().collect()
	}

	pub fn stats(&self) -> OverlayStats {
		let state = self.state.read();
		let distinct: FxHashSet<&ModifierBag<T>> = state.sets.values().collect();
		OverlayStats {
			keys: state.sets.len(),
			distinct_sets: distinct.len(),
			data_entries: state.data.values().map(|entries| entries.len()).sum(),
		}
	}

	/// Registers a listener called after each target's output is applied.
	pub fn subscribe<F>(&self, listener: F)
	where
		F: Fn(&T::Key) + Send + Sync + 'static,
	{
		self.listeners.write().push(Arc::new(listener));
	}

	fn notify_applied(&self, key: &T::Key) {
		let listeners = self.listeners.read().clone();
		for listener in listeners {
			listener(key);
		}
	}

	/// Walks parents from `key` upward, nearest first.
	pub fn ancestors(&self, key: &T::Key) -> Vec<T::Key> {
		let mut out = Vec::new();
		let mut seen = FxHashSet::default();
		seen.insert(key.clone());
		let mut cursor = self.topology.try_get_parent(key);
		while let Some(parent) = cursor {
			if !seen.insert(parent.clone()) {
				break;
			}
			cursor = self.topology.try_get_parent(&parent);
			out.push(parent);
		}
		out
	}

	/// Returns the modifier sets that shape `key`: its own set followed by the
	/// non-empty sets of its ancestors, nearest first.
	pub fn effective_modifiers(&self, key: &T::Key) -> Vec<(T::Key, ModifierBag<T>)> {
		let chain = self.ancestors(key);
		let state = self.state.read();
		let own = state
			.sets
			.get(key)
			.cloned()
			.unwrap_or_else(|| self.pool.empty());
		let mut out = vec![(key.clone(), own)];
		out.extend(
			chain
				.into_iter()
				.filter_map(|k| state.sets.get(&k).cloned().map(|set| (k, set))),
		);
		out
	}
}
