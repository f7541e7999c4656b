//! Secret handling.
//!
//! - `Secret`: wrapper that keeps credentials out of logs and debug output
//! - `scrub_secrets`: redact secrets from backend error messages

use secrecy::{ExposeSecret, SecretBox};
use thiserror::Error;
use zeroize::Zeroize;

/// Raw secret bytes that were not valid UTF-8.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Secret is not valid UTF-8 (valid up to byte {valid_up_to})")]
pub struct InvalidSecret {
    /// Length of the valid UTF-8 prefix.
    pub valid_up_to: usize,
}

/// Credential secret (password or token).
///
/// The inner value is wrapped with `secrecy::SecretBox`, zeroized on drop
/// and never printed by `Debug` or `Display`.
pub struct Secret(SecretBox<str>);

impl Secret {
    /// Create a new secret.
    #[must_use]
    pub fn new(secret: String) -> Self {
        Self(SecretBox::new(secret.into_boxed_str()))
    }

    /// Create a secret from raw bytes.
    ///
    /// The input buffer is zeroized if it is rejected.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not valid UTF-8.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, InvalidSecret> {
        match String::from_utf8(bytes) {
            Ok(secret) => Ok(Self::new(secret)),
            Err(e) => {
                let valid_up_to = e.utf8_error().valid_up_to();
                let mut raw = e.into_bytes();
                raw.zeroize();
                Err(InvalidSecret { valid_up_to })
            }
        }
    }

    /// Expose the secret to the identity backend.
    ///
    /// Use sparingly - only when actually handing it to the backend.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Check if the secret is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expose().is_empty()
    }
}

impl Clone for Secret {
    fn clone(&self) -> Self {
        Self::new(self.expose().to_owned())
    }
}

impl From<String> for Secret {
    fn from(secret: String) -> Self {
        Self::new(secret)
    }
}

impl From<&str> for Secret {
    fn from(secret: &str) -> Self {
        Self::new(secret.to_owned())
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

/// Scrub secrets from error messages and logs.
///
/// Replaces values after known secret patterns with `[REDACTED]`.
///
/// # Arguments
///
/// * `text` - Text to scrub
/// * `patterns` - Patterns to look for (e.g., `["password=", "token="]`)
#[must_use]
pub fn scrub_secrets(text: &str, patterns: &[&str]) -> String {
    let mut result = text.to_string();

    for pattern in patterns {
        let mut search_start = 0;
        while let Some(start) = result[search_start..].find(pattern) {
            let abs_start = search_start + start + pattern.len();

            // Value ends at whitespace, a quote, or a separator
            let end = result[abs_start..]
                .find(|c: char| c.is_whitespace() || c == '"' || c == '\'' || c == '&' || c == ',')
                .map_or(result.len(), |e| abs_start + e);

            result.replace_range(abs_start..end, "[REDACTED]");

            search_start = abs_start + "[REDACTED]".len();
        }
    }

    result
}

/// Secret patterns scrubbed from backend error details.
pub const COMMON_SECRET_PATTERNS: &[&str] = &[
    "password=",
    "passwd=",
    "secret=",
    "token=",
    "Authorization: Basic ",
    "Authorization: Bearer ",
];
