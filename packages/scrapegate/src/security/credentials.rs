//! Credential handling with secure memory.
//!
//! Uses the `secrecy` crate to prevent accidental logging of sensitive values.

use secrecy::{ExposeSecret, SecretBox};
use sha2::{Digest, Sha256};
use std::fmt;

/// A secret string that won't be logged or displayed.
pub struct SecretString(SecretBox<str>);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretBox::new(value.into().into_boxed_str()))
    }

    /// Expose the secret value for use.
    ///
    /// Only call this where the raw value is actually needed.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.expose().is_empty()
    }
}

impl Clone for SecretString {
    fn clone(&self) -> Self {
        Self::new(self.expose())
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Shared key guarding administrative operations.
#[derive(Clone)]
pub struct AdminKey {
    key: SecretString,
}

impl AdminKey {
    pub fn new(key: impl Into<SecretString>) -> Self {
        Self { key: key.into() }
    }

    /// Compare a presented key without short-circuiting on the first
    /// differing byte. An empty configured key matches nothing.
    pub fn verify(&self, candidate: &str) -> bool {
        if self.key.is_empty() {
            return false;
        }
        let expected = Sha256::digest(self.key.expose().as_bytes());
        let presented = Sha256::digest(candidate.as_bytes());
        expected
            .iter()
            .zip(presented.iter())
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
    }
}

impl fmt::Debug for AdminKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminKey").field("key", &"[REDACTED]").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_not_in_debug() {
        let secret = SecretString::new("admin-super-secret");
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("admin-super"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_secret_not_in_display() {
        let secret = SecretString::new("admin-super-secret");
        assert_eq!(format!("{}", secret), "[REDACTED]");
        assert_eq!(secret.expose(), "admin-super-secret");
    }

    #[test]
    fn test_admin_key_verify() {
        let key = AdminKey::new("letmein-please");
        assert!(key.verify("letmein-please"));
        assert!(!key.verify("letmein-pleasE"));
        assert!(!key.verify(""));
        assert!(!format!("{:?}", key).contains("letmein"));
    }

    #[test]
    fn test_empty_admin_key_rejects_everything() {
        let key = AdminKey::new("");
        assert!(!key.verify(""));
    }
}
