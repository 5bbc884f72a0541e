//! Add, update, and remove.
//!
//! Public entry points run the cheap local checks and turn the request into a
//! [`MutationCall`]. The handlers below do the real work once the replication
//! layer has accepted the call.
//!
//! Handlers decide on a snapshot of the key's bag without holding the lock,
//! then commit under the write lock only if the stored bag is still that same
//! instance. A changed bag re-runs the decision.

use lamina_registry::ModifierId;
use smallvec::SmallVec;
use tracing::{debug, trace};

use super::OverlayStore;
use crate::error::Rejection;
use crate::replication::{MutationCall, MutationOp};
use crate::topology::{ModifierBag, ModifierOf, Topology};

/// How much of the incoming call to re-check against local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ApplyMode {
	/// Re-validate applicability against current state.
	Validate,
	/// Trust the authority's decision about the incoming modifier: skip its
	/// applicability check and never drop it as an orphan.
	Follow,
}

/// Outcome of the decide phase, applied verbatim at commit.
struct Edit<T: Topology> {
	set: ModifierBag<T>,
	/// Modifiers whose data entries must go.
	removed: SmallVec<[ModifierId; 4]>,
	/// Data entry to write if the modifier survives in `set`.
	data: Option<(ModifierOf<T>, String)>,
}

impl<T: Topology> OverlayStore<T> {
	/// Adds `modifier` to `key`.
	///
	/// `explicit_data` overrides the modifier's default instance data. Does
	/// nothing if the target is gone or the modifier cannot apply to it.
	pub fn add_modifier(
		&self,
		key: &T::Key,
		modifier: &ModifierOf<T>,
		explicit_data: Option<String>,
	) -> Result<(), Rejection> {
		let current = self.get_modifiers(key);
		let ctx = self
			.topology
			.try_create_context(key, &current)
			.ok_or(Rejection::ContextUnavailable)?;
		if !modifier.can_apply(&ctx) {
			return Err(Rejection::NotApplicable(modifier.id().clone()));
		}
		let data = explicit_data
			.or_else(|| modifier.create_data(&ctx))
			.unwrap_or_default();

		let call = MutationCall::add(self.topology.persist_key(key), modifier.id().clone(), data);
		self.submit(key, modifier, call)
	}

	/// Replaces the instance data of `modifier` on `key`. An empty string
	/// clears it.
	pub fn update_modifier_data(
		&self,
		key: &T::Key,
		modifier: &ModifierOf<T>,
		data: String,
	) -> Result<(), Rejection> {
		if !self.has_modifier(key, modifier) {
			return Err(Rejection::NotPresent(modifier.id().clone()));
		}
		let call =
			MutationCall::update_data(self.topology.persist_key(key), modifier.id().clone(), data);
		self.submit(key, modifier, call)
	}

	/// Removes `modifier` from `key`, together with any modifier that depended
	/// on it.
	pub fn remove_modifier(&self, key: &T::Key, modifier: &ModifierOf<T>) -> Result<(), Rejection> {
		if !self.has_modifier(key, modifier) {
			return Err(Rejection::NotPresent(modifier.id().clone()));
		}
		let call = MutationCall::remove(self.topology.persist_key(key), modifier.id().clone());
		self.submit(key, modifier, call)
	}

	/// Runs the handler for an accepted call.
	pub(crate) fn execute(
		&self,
		key: &T::Key,
		modifier: &ModifierOf<T>,
		call: &MutationCall<T::PersistedKey>,
		mode: ApplyMode,
	) -> Result<(), Rejection> {
		match call.op {
			MutationOp::Add => self.handle_add(key, modifier, &call.data, mode),
			MutationOp::UpdateData => self.handle_update(key, modifier, &call.data),
			MutationOp::Remove => self.handle_remove(key, modifier),
		}
	}

	fn handle_add(
		&self,
		key: &T::Key,
		modifier: &ModifierOf<T>,
		data: &str,
		mode: ApplyMode,
	) -> Result<(), Rejection> {
		self.commit(key, |current| {
			if mode == ApplyMode::Validate {
				let ctx = self
					.topology
					.try_create_context(key, current)
					.ok_or(Rejection::ContextUnavailable)?;
				if !modifier.can_apply(&ctx) {
					return Err(Rejection::NotApplicable(modifier.id().clone()));
				}
			}

			let added = current.with(modifier);
			if added.ptr_eq(current) {
				return Err(Rejection::NoOp);
			}

			let evicted: SmallVec<[ModifierOf<T>; 4]> = current
				.iter()
				.filter(|existing| modifier.should_evict(existing))
				.cloned()
				.collect();
			let mut removed: SmallVec<[ModifierId; 4]> =
				evicted.iter().map(|m| m.id().clone()).collect();
			let set = added.without_where(|m| evicted.contains(m));
			if !evicted.is_empty() {
				trace!(?key, added = %modifier.id(), ?removed, "evicted modifiers");
			}

			let keep = (mode == ApplyMode::Follow).then_some(modifier);
			let set = self.close_orphans(key, set, keep, &mut removed);
			if !set.contains(modifier) {
				// Its own evictions orphaned it; nothing is committed or broadcast.
				return Err(Rejection::NotApplicable(modifier.id().clone()));
			}
			Ok(Edit {
				set,
				removed,
				data: Some((modifier.clone(), data.to_owned())),
			})
		})
	}

	fn handle_update(&self, key: &T::Key, modifier: &ModifierOf<T>, data: &str) -> Result<(), Rejection> {
		self.commit(key, |current| {
			if !current.contains(modifier) {
				return Err(Rejection::NotPresent(modifier.id().clone()));
			}
			Ok(Edit {
				set: current.clone(),
				removed: SmallVec::new(),
				data: Some((modifier.clone(), data.to_owned())),
			})
		})
	}

	fn handle_remove(&self, key: &T::Key, modifier: &ModifierOf<T>) -> Result<(), Rejection> {
		self.commit(key, |current| {
			let set = current.without(modifier);
			if set.ptr_eq(current) {
				return Err(Rejection::NoOp);
			}
			let mut removed = SmallVec::new();
			removed.push(modifier.id().clone());
			let set = self.close_orphans(key, set, None, &mut removed);
			Ok(Edit {
				set,
				removed,
				data: None,
			})
		})
	}

	/// Drops modifiers whose preconditions fail until a pass drops nothing.
	///
	/// Each pass rebuilds the context from the shrinking candidate, so a
	/// dependency chain unravels one link per pass. Stops early if the target's
	/// context cannot be built. `keep` is never dropped.
	fn close_orphans(
		&self,
		key: &T::Key,
		mut set: ModifierBag<T>,
		keep: Option<&ModifierOf<T>>,
		removed: &mut SmallVec<[ModifierId; 4]>,
	) -> ModifierBag<T> {
		loop {
			let Some(ctx) = self.topology.try_create_context(key, &set) else {
				return set;
			};
			let orphans: SmallVec<[ModifierOf<T>; 4]> = set
				.iter()
				.filter(|m| keep != Some(*m) && !m.can_apply(&ctx))
				.cloned()
				.collect();
			if orphans.is_empty() {
				return set;
			}
			trace!(?key, ?orphans, "dropping orphaned modifiers");
			set = set.without_where(|m| orphans.contains(m));
			removed.extend(orphans.iter().map(|m| m.id().clone()));
		}
	}

	/// Decide-then-commit loop shared by all handlers.
	fn commit<F>(&self, key: &T::Key, mut decide: F) -> Result<(), Rejection>
	where
		F: FnMut(&ModifierBag<T>) -> Result<Edit<T>, Rejection>,
	{
		for attempt in 0..=self.config.commit_retries {
			let current = self.get_modifiers(key);
			let edit = decide(&current)?;

			{
				let mut state = self.state.write();
				let unchanged = match state.sets.get(key) {
					Some(stored) => stored.ptr_eq(&current),
					None => current.is_empty(),
				};
				if !unchanged {
					debug!(?key, attempt, "modifier set changed during edit; retrying");
					continue;
				}

				for id in &edit.removed {
					state.remove_data(key, id);
				}
				if let Some((modifier, payload)) = edit.data
					&& edit.set.contains(&modifier)
				{
					state.put_data(key, modifier.id().clone(), payload);
				}
				if edit.set.is_empty() {
					state.sets.remove(key);
					state.data.remove(key);
				} else {
					state.sets.insert(key.clone(), edit.set);
				}
			}

			self.dispatch_recompute(key);
			return Ok(());
		}
		Err(Rejection::Contended)
	}
}
