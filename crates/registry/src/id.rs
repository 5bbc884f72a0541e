use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Stable identifier of a modifier definition.
///
/// Serialized as a plain string. Cloning shares the underlying allocation.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModifierId(Arc<str>);

impl ModifierId {
	pub fn new(id: impl Into<Arc<str>>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Debug for ModifierId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "ModifierId({:?})", &*self.0)
	}
}

impl fmt::Display for ModifierId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl Borrow<str> for ModifierId {
	fn borrow(&self) -> &str {
		&self.0
	}
}

impl AsRef<str> for ModifierId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

impl From<&str> for ModifierId {
	fn from(id: &str) -> Self {
		Self(id.into())
	}
}

impl From<String> for ModifierId {
	fn from(id: String) -> Self {
		Self(id.into())
	}
}

impl Serialize for ModifierId {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.0)
	}
}

impl<'de> Deserialize<'de> for ModifierId {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		String::deserialize(deserializer).map(Self::from)
	}
}
