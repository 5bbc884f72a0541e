//! Store configuration loaded from TOML.
//!
//! Every field has a default, so an empty document is a valid configuration:
//!
//! ```toml
//! [pool]
//! shards = 16
//! reuse_capacity = 64
//! sweep_every = 256
//!
//! [store]
//! commit_retries = 4
//! gc_interval_secs = 30
//!
//! [trust]
//! max_distance = 10.0
//! ```

use std::path::Path;
use std::time::Duration;

use lamina_bag::PoolConfig;
use serde::Deserialize;

use crate::error::ConfigError;

/// Top-level overlay configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
	/// Intern table tuning for the modifier bag pool.
	pub pool: PoolConfig,
	pub store: StoreConfig,
	pub trust: TrustConfig,
}

/// Mutation and housekeeping knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
	/// How often a commit re-runs its decision after losing to a concurrent
	/// edit on the same key before giving up.
	pub commit_retries: u32,
	/// Minimum interval between garbage collection passes driven by
	/// [`OverlayStore::tick`](crate::OverlayStore::tick).
	pub gc_interval_secs: u64,
}

impl Default for StoreConfig {
	fn default() -> Self {
		Self {
			commit_retries: 4,
			gc_interval_secs: 30,
		}
	}
}

impl StoreConfig {
	pub fn gc_interval(&self) -> Duration {
		Duration::from_secs(self.gc_interval_secs)
	}
}

/// Parameters for [`StandardTrust`](crate::StandardTrust).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
	/// Maximum distance between a non-elevated peer and the target it edits.
	pub max_distance: f32,
}

impl Default for TrustConfig {
	fn default() -> Self {
		Self { max_distance: 10.0 }
	}
}

impl OverlayConfig {
	/// Parses a configuration document.
	pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(src)?)
	}

	/// Reads and parses a configuration file.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let src = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::from_toml_str(&src)
	}
}
