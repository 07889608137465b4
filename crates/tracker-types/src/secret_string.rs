//! Secret string type for account tokens.
//!
//! Order sources that talk to an account-scoped endpoint carry a session or
//! bearer token. `SecretString` keeps that token out of logs and debug output
//! and zeroes its memory on drop.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::Zeroizing;

const REDACTED: &str = "***REDACTED***";

/// A token that is never printed and is wiped on drop.
#[derive(Clone)]
pub struct SecretString(Zeroizing<String>);

impl SecretString {
	pub fn new(s: String) -> Self {
		Self(Zeroizing::new(s))
	}

	/// Exposes the secret. Never log the returned value.
	pub fn expose_secret(&self) -> &str {
		&self.0
	}

	pub fn is_empty(&self) -> bool {
		self.0.trim().is_empty()
	}
}

impl fmt::Debug for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "SecretString({})", REDACTED)
	}
}

impl fmt::Display for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}

impl From<String> for SecretString {
	fn from(s: String) -> Self {
		Self::new(s)
	}
}

impl From<&str> for SecretString {
	fn from(s: &str) -> Self {
		Self::new(s.to_string())
	}
}

impl PartialEq for SecretString {
	fn eq(&self, other: &Self) -> bool {
		self.0.as_str() == other.0.as_str()
	}
}

impl Eq for SecretString {}

// Serializing always redacts; configs are read, never written back.
impl Serialize for SecretString {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(REDACTED)
	}
}

impl<'de> Deserialize<'de> for SecretString {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		String::deserialize(deserializer).map(SecretString::new)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_token_never_printed() {
		let token = SecretString::from("session-token-abc");
		assert_eq!(format!("{:?}", token), "SecretString(***REDACTED***)");
		assert_eq!(token.to_string(), REDACTED);
		assert_eq!(serde_json::to_string(&token).unwrap(), "\"***REDACTED***\"");
	}

	#[test]
	fn test_token_expose_and_eq() {
		let token: SecretString = serde_json::from_str("\"session-token-abc\"").unwrap();
		assert_eq!(token.expose_secret(), "session-token-abc");
		assert_eq!(token, SecretString::from("session-token-abc"));
		assert_ne!(token, SecretString::from("other"));
		assert!(SecretString::from("  ").is_empty());
	}
}
