//! Replicated mutation calls and sender trust.
//!
//! # Role
//!
//! Every mutation leaves the process as a [`MutationCall`] and enters other
//! participants through [`OverlayStore::receive`]. The authority validates the
//! sender, applies the call, and fans it out to everyone else. Mirrors apply
//! what the authority sends without re-deriving applicability of the incoming
//! modifier from their possibly stale local view.
//!
//! # Invariants
//!
//! - A rejected call leaves the store unchanged. An authority reports it to
//!   the transport exactly once; a mirror only logs it.
//! - A mirror with a known authority follows no one else.
//! - Calls that originate locally are never trust-checked.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use lamina_registry::ModifierId;

use crate::config::TrustConfig;
use crate::error::Rejection;
use crate::store::{ApplyMode, OverlayStore};
use crate::topology::{ModifierOf, Topology};

/// Identity of a remote participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u64);

/// Kind of replicated mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationOp {
	Add,
	UpdateData,
	Remove,
}

/// A replicated mutation as it travels between participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationCall<P> {
	pub op: MutationOp,
	/// Persisted form of the target key.
	pub key: P,
	pub modifier: ModifierId,
	/// Opaque instance data; empty means none. Always empty for removals.
	pub data: String,
}

impl<P> MutationCall<P> {
	pub fn add(key: P, modifier: ModifierId, data: String) -> Self {
		Self {
			op: MutationOp::Add,
			key,
			modifier,
			data,
		}
	}

	pub fn update_data(key: P, modifier: ModifierId, data: String) -> Self {
		Self {
			op: MutationOp::UpdateData,
			key,
			modifier,
			data,
		}
	}

	pub fn remove(key: P, modifier: ModifierId) -> Self {
		Self {
			op: MutationOp::Remove,
			key,
			modifier,
			data: String::new(),
		}
	}
}

/// Local role in the replication topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
	/// Validates and decides; rebroadcasts accepted calls.
	#[default]
	Authority,
	/// Follows the authority's decisions.
	Mirror,
}

/// Outbound side of the network layer.
pub trait Transport<P>: Send + Sync {
	/// Sends `call` to every participant except `except`.
	fn broadcast(&self, call: &MutationCall<P>, except: Option<PeerId>);

	/// Tells the transport that a call from `peer` was refused, so it can roll
	/// the event back on the sender.
	fn reject(&self, peer: PeerId, call: &MutationCall<P>, reason: &Rejection);
}

/// Transport for a store that is not networked.
#[derive(Debug, Clone, Copy, Default)]
pub struct Offline;

impl<P> Transport<P> for Offline {
	fn broadcast(&self, _call: &MutationCall<P>, _except: Option<PeerId>) {}

	fn reject(&self, _peer: PeerId, _call: &MutationCall<P>, _reason: &Rejection) {}
}

/// Decides whether a remote peer may mutate a target.
pub trait TrustPolicy<K>: Send + Sync {
	fn is_trusted(&self, peer: PeerId, key: &K) -> bool;
}

impl<K, F> TrustPolicy<K> for F
where
	F: Fn(PeerId, &K) -> bool + Send + Sync,
{
	fn is_trusted(&self, peer: PeerId, key: &K) -> bool {
		self(peer, key)
	}
}

/// Trusts no remote peer.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyRemote;

impl<K> TrustPolicy<K> for DenyRemote {
	fn is_trusted(&self, _peer: PeerId, _key: &K) -> bool {
		false
	}
}

/// Permission queries answered by the surrounding game or application.
pub trait Permissions<K>: Send + Sync {
	/// Peer runs in an elevated mode that bypasses spatial checks.
	fn is_elevated(&self, peer: PeerId) -> bool;

	/// Distance between the peer's presence and the target, if both exist.
	fn distance(&self, peer: PeerId, key: &K) -> Option<f32>;

	/// Area and ownership checks for the target.
	fn has_access(&self, peer: PeerId, key: &K) -> bool;
}

/// Elevated peers are always trusted; everyone else must be close to the
/// target and pass the access check.
#[derive(Debug, Clone)]
pub struct StandardTrust<P> {
	permissions: P,
	max_distance: f32,
}

impl<P> StandardTrust<P> {
	pub fn new(permissions: P, config: &TrustConfig) -> Self {
		Self {
			permissions,
			max_distance: config.max_distance,
		}
	}
}

impl<K, P> TrustPolicy<K> for StandardTrust<P>
where
	P: Permissions<K>,
{
	fn is_trusted(&self, peer: PeerId, key: &K) -> bool {
		if self.permissions.is_elevated(peer) {
			return true;
		}
		let near = self
			.permissions
			.distance(peer, key)
			.is_some_and(|d| d <= self.max_distance);
		near && self.permissions.has_access(peer, key)
	}
}

impl<T: Topology> OverlayStore<T> {
	/// Handles a mutation call received from `sender`.
	///
	/// On rejection the store is untouched. An authority also notifies the
	/// transport so the sender can roll back.
	pub fn receive(&self, sender: PeerId, call: MutationCall<T::PersistedKey>) -> Result<(), Rejection> {
		let result = self
			.validate_remote(sender, &call)
			.and_then(|(key, modifier)| {
				let mode = match self.role() {
					Role::Authority => ApplyMode::Validate,
					Role::Mirror => ApplyMode::Follow,
				};
				self.execute(&key, &modifier, &call, mode)
			});

		match result {
			Ok(()) => {
				if self.role() == Role::Authority {
					self.transport().broadcast(&call, Some(sender));
				}
				Ok(())
			}
			Err(reason) => {
				match self.role() {
					Role::Authority => {
						debug!(?sender, op = ?call.op, modifier = %call.modifier, %reason, "rejected remote call");
						self.transport().reject(sender, &call, &reason);
					}
					Role::Mirror => {
						warn!(?sender, op = ?call.op, modifier = %call.modifier, %reason, "mirror could not follow call");
					}
				}
				Err(reason)
			}
		}
	}

	fn validate_remote(
		&self,
		sender: PeerId,
		call: &MutationCall<T::PersistedKey>,
	) -> Result<(T::Key, ModifierOf<T>), Rejection> {
		let modifier = self
			.registry()
			.get(call.modifier.as_str())
			.ok_or_else(|| Rejection::UnknownModifier(call.modifier.clone()))?;
		let key = self
			.topology()
			.resolve_key(&call.key)
			.ok_or(Rejection::UnresolvedKey)?;
		let trusted = match self.role() {
			Role::Authority => self.trust().is_trusted(sender, &key),
			Role::Mirror => self.authority().is_none_or(|authority| authority == sender),
		};
		if !trusted {
			return Err(Rejection::Untrusted(sender));
		}
		Ok((key, modifier))
	}

	/// Applies a locally originated call and hands it to the transport.
	pub(crate) fn submit(
		&self,
		key: &T::Key,
		modifier: &ModifierOf<T>,
		call: MutationCall<T::PersistedKey>,
	) -> Result<(), Rejection> {
		self.execute(key, modifier, &call, ApplyMode::Validate)?;
		self.transport().broadcast(&call, None);
		Ok(())
	}
}
