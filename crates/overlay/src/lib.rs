//! Replicated modifier overlay store.
//!
//! The [`OverlayStore`] keeps, for every addressable target, the canonical set
//! of modifiers layered onto it plus per-instance data, and folds those
//! modifiers into an output that the [`Topology`] writes back to the target.
//!
//! # Flow
//!
//! ```text
//! add/update/remove ──► replication (trust, id resolution)
//!                              │
//!                              ▼
//!                   decide (outside lock) ──► eviction ──► orphan closure
//!                              │
//!                              ▼
//!                   commit (write lock, identity check)
//!                              │
//!                              ▼
//!                   recompute key + descendants ──► Topology::apply_output
//! ```
//!
//! Targets, their hierarchy, and the meaning of a modifier are external: the
//! store only talks to them through [`Topology`] and
//! [`lamina_registry::ModifierDefinition`].

pub mod config;
pub mod error;
pub mod persist;
pub mod replication;
pub mod store;
pub mod topology;

pub use config::{OverlayConfig, StoreConfig, TrustConfig};
pub use error::{ConfigError, PersistError, Rejection};
pub use persist::{DataRecord, LoadReport, OverlaySnapshot, SNAPSHOT_VERSION, SetRecord};
pub use replication::{
	DenyRemote, MutationCall, MutationOp, Offline, PeerId, Permissions, Role, StandardTrust,
	Transport, TrustPolicy,
};
pub use store::{OverlayStats, OverlayStore, OverlayStoreBuilder};
pub use topology::{ModifierBag, ModifierOf, Topology};
