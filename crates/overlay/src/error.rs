//! Error types for the overlay store.

use std::path::PathBuf;

use lamina_registry::ModifierId;
use thiserror::Error;

use crate::replication::PeerId;

/// Why a mutation was not applied.
///
/// Every variant leaves the store unchanged. Local callers may treat any of
/// them as a no-op; the replication layer reports them to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
	/// The modifier id does not resolve in the registry.
	#[error("unknown modifier {0}")]
	UnknownModifier(ModifierId),
	/// The persisted key does not map to a live target.
	#[error("target key does not resolve")]
	UnresolvedKey,
	/// The sender is not allowed to modify the target.
	#[error("peer {0:?} is not trusted for this target")]
	Untrusted(PeerId),
	/// The target's context could not be built.
	#[error("target context unavailable")]
	ContextUnavailable,
	/// The modifier's preconditions do not hold on the target.
	#[error("modifier {0} cannot apply to this target")]
	NotApplicable(ModifierId),
	/// The edit would not change the target's modifier set.
	#[error("edit does not change the modifier set")]
	NoOp,
	/// The modifier is not active on the target.
	#[error("modifier {0} is not present on this target")]
	NotPresent(ModifierId),
	/// Concurrent edits kept invalidating the decision.
	#[error("edit lost to concurrent mutations")]
	Contended,
}

/// Persisted state could not be encoded or decoded.
#[derive(Debug, Error)]
pub enum PersistError {
	#[error("binary encoding failed: {0}")]
	Binary(#[from] postcard::Error),

	#[error("json encoding failed: {0}")]
	Json(#[from] serde_json::Error),

	#[error("unsupported snapshot version {found} (expected {expected})")]
	UnsupportedVersion { found: u32, expected: u32 },
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error reading a configuration file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// Error parsing TOML.
	#[error("TOML parse error: {0}")]
	Parse(#[from] toml::de::Error),
}
