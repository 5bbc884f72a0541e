//! Folding modifier sets into outputs.
//!
//! A mutation on one key recomputes that key and every descendant, because a
//! child's base context may depend on its parent's folded output. The walk runs
//! inline on the calling thread. Walks from different threads take turns, so
//! each one folds the state committed before it started.
//!
//! Output order follows bag iteration order. Equal sets always fold in the
//! same order within a process, but nothing guarantees that order across
//! processes, so modifier effects should commute.

use std::cell::Cell;
use std::collections::VecDeque;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use rustc_hash::FxHashSet;
use tracing::{debug, trace};

use super::OverlayStore;
use crate::topology::Topology;

/// Holds the store's walk lock for the lifetime of one walk.
///
/// The lock is re-entrant, so a request from inside a running walk on the
/// same thread gets through it and is then refused by the flag. Other threads
/// block until the walk finishes.
struct RecomputeGuard<'a>(ReentrantMutexGuard<'a, Cell<bool>>);

impl<'a> RecomputeGuard<'a> {
	fn acquire(lock: &'a ReentrantMutex<Cell<bool>>) -> Option<Self> {
		let guard = lock.lock();
		if guard.replace(true) {
			return None;
		}
		Some(Self(guard))
	}
}

impl Drop for RecomputeGuard<'_> {
	fn drop(&mut self) {
		self.0.set(false);
	}
}

impl<T: Topology> OverlayStore<T> {
	/// Recomputes `key` and its descendants.
	///
	/// Requests made from inside a walk on the same thread, such as from an
	/// output or listener callback, are dropped. Requests from other threads
	/// wait for the running walk.
	pub fn dispatch_recompute(&self, key: &T::Key) {
		let Some(_guard) = RecomputeGuard::acquire(&self.recomputing) else {
			debug!(?key, "recompute requested from inside a walk; dropped");
			return;
		};
		let mut visited = FxHashSet::default();
		self.walk(std::iter::once(key.clone()), &mut visited);
	}

	/// Re-applies all stored state to freshly constructed targets.
	///
	/// Recomputes every key with modifiers plus all their descendants, each
	/// once. Returns the number of keys visited, or zero if called from
	/// inside a walk on the same thread.
	pub fn attach(&self) -> usize {
		let Some(_guard) = RecomputeGuard::acquire(&self.recomputing) else {
			debug!("attach requested from inside a walk; dropped");
			return 0;
		};
		let roots = self.keys();
		let mut visited = FxHashSet::default();
		self.walk(roots, &mut visited);
		debug!(keys = visited.len(), "attached overlay");
		visited.len()
	}

	/// Breadth-first over `roots` and their descendants, skipping keys
	/// already in `visited`.
	fn walk(&self, roots: impl IntoIterator<Item = T::Key>, visited: &mut FxHashSet<T::Key>) {
		let mut queue: VecDeque<T::Key> = roots.into_iter().collect();
		let mut children = Vec::new();
		while let Some(key) = queue.pop_front() {
			if !visited.insert(key.clone()) {
				continue;
			}
			self.recompute_one(&key);

			children.clear();
			self.topology.get_children(&key, &mut children);
			queue.extend(children.drain(..).filter(|child| !visited.contains(child)));
		}
	}

	fn recompute_one(&self, key: &T::Key) {
		let (set, data) = {
			let state = self.state.read();
			let set = state
				.sets
				.get(key)
				.cloned()
				.unwrap_or_else(|| self.pool.empty());
			(set, state.data.get(key).cloned())
		};

		let Some(ctx) = self.topology.try_create_context(key, &set) else {
			trace!(?key, "context unavailable; skipping recompute");
			return;
		};
		let mut output = self.topology.create_output(key, &ctx);
		for modifier in &set {
			let payload = data.as_ref().and_then(|d| d.get(modifier.id())).map(String::as_str);
			modifier.apply(&ctx, payload, &mut output);
		}
		self.topology.apply_output(key, &ctx, output);
		self.notify_applied(key);
	}
}
