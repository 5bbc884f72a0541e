//! Persisted overlay state.
//!
//! The snapshot layout exploits interning: each distinct canonical set is
//! written once together with every key that uses it, and instance data is
//! grouped per modifier.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use lamina_registry::ModifierId;

use crate::error::PersistError;
use crate::store::{OverlayState, OverlayStore};
use crate::topology::{ModifierBag, ModifierOf, Topology};

/// Layout version written by [`OverlayStore::snapshot`].
pub const SNAPSHOT_VERSION: u32 = 1;

/// One distinct modifier set and the keys that carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetRecord<P> {
	pub modifiers: Vec<ModifierId>,
	pub keys: Vec<P>,
}

/// Instance data of one modifier across all keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRecord<P> {
	pub modifier: ModifierId,
	pub entries: Vec<(P, String)>,
}

/// Serializable image of an [`OverlayStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlaySnapshot<P> {
	pub version: u32,
	pub sets: Vec<SetRecord<P>>,
	pub data: Vec<DataRecord<P>>,
}

impl<P> Default for OverlaySnapshot<P> {
	fn default() -> Self {
		Self {
			version: SNAPSHOT_VERSION,
			sets: Vec::new(),
			data: Vec::new(),
		}
	}
}

impl<P: Serialize> OverlaySnapshot<P> {
	/// Compact binary encoding.
	pub fn to_bytes(&self) -> Result<Vec<u8>, PersistError> {
		Ok(postcard::to_allocvec(self)?)
	}

	pub fn to_json(&self) -> Result<String, PersistError> {
		Ok(serde_json::to_string_pretty(self)?)
	}
}

impl<P: for<'de> Deserialize<'de>> OverlaySnapshot<P> {
	pub fn from_bytes(bytes: &[u8]) -> Result<Self, PersistError> {
		Ok(postcard::from_bytes(bytes)?)
	}

	pub fn from_json(src: &str) -> Result<Self, PersistError> {
		Ok(serde_json::from_str(src)?)
	}
}

/// What [`OverlayStore::load`] kept and what it threw away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadReport {
	/// Keys restored with a modifier set.
	pub keys: usize,
	/// Distinct sets restored.
	pub sets: usize,
	/// Instance data entries restored.
	pub data_entries: usize,
	/// Keys dropped for an unknown modifier or an unresolvable key.
	pub dropped_keys: usize,
	/// Data entries dropped as unknown, orphaned, or malformed.
	pub dropped_data: usize,
}

impl<T: Topology> OverlayStore<T> {
	/// Captures the store's contents.
	///
	/// Modifier ids within a set record are sorted so equal sets always
	/// serialize identically.
	pub fn snapshot(&self) -> OverlaySnapshot<T::PersistedKey> {
		let (sets, data) = {
			let state = self.state.read();
			(state.sets.clone(), state.data.clone())
		};

		let mut grouped: FxHashMap<ModifierBag<T>, Vec<T::Key>> = FxHashMap::default();
		for (key, set) in sets {
			grouped.entry(set).or_default().push(key);
		}
		let mut set_records: Vec<SetRecord<T::PersistedKey>> = grouped
			.into_iter()
			.map(|(set, keys)| {
				let mut modifiers: Vec<ModifierId> = set.iter().map(|m| m.id().clone()).collect();
				modifiers.sort();
				SetRecord {
					modifiers,
					keys: keys.iter().map(|k| self.topology().persist_key(k)).collect(),
				}
			})
			.collect();
		set_records.sort_by(|a, b| a.modifiers.cmp(&b.modifiers));

		let mut by_modifier: FxHashMap<ModifierId, Vec<(T::PersistedKey, String)>> =
			FxHashMap::default();
		for (key, entries) in data {
			let persisted = self.topology().persist_key(&key);
			for (id, payload) in entries {
				by_modifier
					.entry(id)
					.or_default()
					.push((persisted.clone(), payload));
			}
		}
		let mut data_records: Vec<DataRecord<T::PersistedKey>> = by_modifier
			.into_iter()
			.map(|(modifier, entries)| DataRecord { modifier, entries })
			.collect();
		data_records.sort_by(|a, b| a.modifier.cmp(&b.modifier));

		OverlaySnapshot {
			version: SNAPSHOT_VERSION,
			sets: set_records,
			data: data_records,
		}
	}

	/// Replaces the store's contents with `snapshot`.
	///
	/// Entries that no longer make sense are dropped with a warning instead of
	/// failing the load. Nothing is recomputed; call
	/// [`attach`](Self::attach) once the targets exist.
	pub fn load(&self, snapshot: OverlaySnapshot<T::PersistedKey>) -> Result<LoadReport, PersistError> {
		if snapshot.version != SNAPSHOT_VERSION {
			return Err(PersistError::UnsupportedVersion {
				found: snapshot.version,
				expected: SNAPSHOT_VERSION,
			});
		}

		let mut report = LoadReport::default();
		let mut next = OverlayState::<T>::default();

		for record in snapshot.sets {
			let modifiers: Option<Vec<ModifierOf<T>>> =
				record.modifiers.iter().map(|id| self.registry().get(id.as_str())).collect();
			let Some(modifiers) = modifiers else {
				warn!(modifiers = ?record.modifiers, keys = record.keys.len(), "dropping set with unknown modifier");
				report.dropped_keys += record.keys.len();
				continue;
			};
			let set = self.pool().of(modifiers);
			if set.is_empty() {
				report.dropped_keys += record.keys.len();
				continue;
			}
			for persisted in &record.keys {
				match self.topology().resolve_key(persisted) {
					Some(key) => {
						next.sets.insert(key, set.clone());
					}
					None => {
						warn!(key = ?persisted, "dropping unresolvable key");
						report.dropped_keys += 1;
					}
				}
			}
		}

		for record in snapshot.data {
			let Some(modifier) = self.registry().get(record.modifier.as_str()) else {
				warn!(modifier = %record.modifier, entries = record.entries.len(), "dropping data of unknown modifier");
				report.dropped_data += record.entries.len();
				continue;
			};
			for (persisted, payload) in record.entries {
				let Some(key) = self.topology().resolve_key(&persisted) else {
					warn!(key = ?persisted, modifier = %record.modifier, "dropping data of unresolvable key");
					report.dropped_data += 1;
					continue;
				};
				let present = next.sets.get(&key).is_some_and(|set| set.contains(&modifier));
				if !present || !modifier.validate_data(&payload) {
					warn!(?key, modifier = %record.modifier, present, "dropping data entry");
					report.dropped_data += 1;
					continue;
				}
				if !payload.is_empty() {
					next.data
						.entry(key)
						.or_default()
						.insert(modifier.id().clone(), payload);
				}
			}
		}

		report.keys = next.sets.len();
		report.sets = next.sets.values().collect::<FxHashSet<_>>().len();
		report.data_entries = next.data.values().map(|entries| entries.len()).sum();

		*self.state.write() = next;
		info!(
			keys = report.keys,
			sets = report.sets,
			data = report.data_entries,
			dropped_keys = report.dropped_keys,
			dropped_data = report.dropped_data,
			"loaded overlay snapshot"
		);
		Ok(report)
	}
}
