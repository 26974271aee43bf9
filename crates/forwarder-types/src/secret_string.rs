//! Key material that never reaches a log line.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroizing;

const MASK: &str = "<redacted>";

/// A private key held as text. Formatting and serialization print a mask,
/// and the buffer is wiped when the last clone drops.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString {
	inner: Zeroizing<String>,
}

impl SecretString {
	pub fn new(value: String) -> Self {
		Self {
			inner: Zeroizing::new(value),
		}
	}

	/// Lends the plain text to `f`.
	pub fn with_exposed<R>(&self, f: impl FnOnce(&str) -> R) -> R {
		f(self.inner.as_str())
	}
}

impl fmt::Debug for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("SecretString").field(&MASK).finish()
	}
}

impl fmt::Display for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(MASK)
	}
}

impl From<String> for SecretString {
	fn from(value: String) -> Self {
		Self::new(value)
	}
}

impl From<&str> for SecretString {
	fn from(value: &str) -> Self {
		Self::new(value.to_owned())
	}
}

impl Serialize for SecretString {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(MASK)
	}
}

impl<'de> Deserialize<'de> for SecretString {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		String::deserialize(deserializer).map(Self::new)
	}
}
