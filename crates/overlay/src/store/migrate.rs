//! Garbage collection and topology migration.

use std::collections::VecDeque;
use std::time::Instant;

use rustc_hash::FxHashSet;
use tracing::{debug, info};

use super::{KeyData, OverlayStore};
use crate::topology::{ModifierBag, Topology};

impl<T: Topology> OverlayStore<T> {
	/// Drops every entry whose target context can no longer be built.
	///
	/// Returns the number of keys removed.
	pub fn remove_extra_modifiers(&self) -> usize {
		let entries: Vec<(T::Key, ModifierBag<T>)> = self
			.state
			.read()
			.sets
			.iter()
			.map(|(key, set)| (key.clone(), set.clone()))
			.collect();

		let dead: Vec<(T::Key, ModifierBag<T>)> = entries
			.into_iter()
			.filter(|(key, set)| self.topology.try_create_context(key, set).is_none())
			.collect();
		if dead.is_empty() {
			return 0;
		}

		let mut removed = 0;
		{
			let mut state = self.state.write();
			for (key, set) in &dead {
				// A concurrent edit means the target answered a context request since.
				if !state.sets.get(key).is_some_and(|stored| stored.ptr_eq(set)) {
					continue;
				}
				state.sets.remove(key);
				state.data.remove(key);
				removed += 1;
			}
		}
		info!(removed, "removed modifiers of missing targets");
		removed
	}

	/// Runs [`remove_extra_modifiers`](Self::remove_extra_modifiers) if the
	/// configured interval has passed since the last pass, then purges dead
	/// bags from the pool.
	///
	/// Returns `None` when the pass was skipped.
	pub fn tick(&self, now: Instant) -> Option<usize> {
		{
			let mut last = self.last_gc.lock();
			if let Some(prev) = *last
				&& now.saturating_duration_since(prev) < self.config.gc_interval()
			{
				return None;
			}
			*last = Some(now);
		}
		let removed = self.remove_extra_modifiers();
		let purged = self.pool.purge();
		debug!(removed, purged, "overlay gc pass");
		Some(removed)
	}

	/// Copies all of `other`'s entries into this store ahead of a merge of the
	/// two hierarchies. Colliding keys take `other`'s entry.
	///
	/// Does not recompute; the merged hierarchy is expected to
	/// [`attach`](Self::attach) once rebuilt.
	pub fn before_merge(&self, other: &Self) {
		if std::ptr::eq(self, other) {
			return;
		}
		let (sets, data) = {
			let state = other.state.read();
			(state.sets.clone(), state.data.clone())
		};
		let sets: Vec<(T::Key, ModifierBag<T>)> = sets
			.into_iter()
			.map(|(key, set)| {
				let set = self.pool.adopt(&set);
				(key, set)
			})
			.collect();

		let merged = sets.len();
		{
			let mut state = self.state.write();
			for (key, set) in sets {
				state.data.remove(&key);
				state.sets.insert(key, set);
			}
			for (key, entries) in data {
				if state.sets.contains_key(&key) {
					state.data.insert(key, entries);
				}
			}
		}
		debug!(merged, "merged overlay entries");
	}

	/// Removes `root` and all its descendants from this store, moving their
	/// entries into `destination` when one is given.
	///
	/// Returns the number of keys that carried modifiers. Moving into the same
	/// store is a no-op.
	pub fn move_or_remove(&self, root: &T::Key, destination: Option<&Self>) -> usize {
		if destination.is_some_and(|dest| std::ptr::eq(self, dest)) {
			return 0;
		}
		let subtree = self.subtree(root);

		let mut moved: Vec<(T::Key, ModifierBag<T>, Option<KeyData>)> = Vec::new();
		{
			let mut state = self.state.write();
			for key in subtree {
				if let Some(set) = state.sets.remove(&key) {
					let data = state.data.remove(&key);
					moved.push((key, set, data));
				}
			}
		}
		let count = moved.len();

		if let Some(dest) = destination {
			let moved: Vec<_> = moved
				.into_iter()
				.map(|(key, set, data)| (key, dest.pool.adopt(&set), data))
				.collect();
			let mut state = dest.state.write();
			for (key, set, data) in moved {
				state.sets.insert(key.clone(), set);
				match data {
					Some(entries) => {
						state.data.insert(key, entries);
					}
					None => {
						state.data.remove(&key);
					}
				}
			}
		}
		debug!(?root, count, moved = destination.is_some(), "detached overlay subtree");
		count
	}

	/// `root` and every key reachable through children, breadth first.
	fn subtree(&self, root: &T::Key) -> Vec<T::Key> {
		let mut seen = FxHashSet::default();
		let mut out = Vec::new();
		let mut queue = VecDeque::from([root.clone()]);
		let mut children = Vec::new();
		while let Some(key) = queue.pop_front() {
			if !seen.insert(key.clone()) {
				continue;
			}
			children.clear();
			self.topology.get_children(&key, &mut children);
			queue.extend(children.drain(..));
			out.push(key);
		}
		out
	}
}
