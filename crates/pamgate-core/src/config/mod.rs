//! Configuration loading and validation.
//!
//! Config is JSON5. Default location: `~/.pamgate/pamgate.json`, or
//! `$PAMGATE_STATE_DIR/pamgate.json` when the variable is set.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// PAM service used when none is configured.
pub const DEFAULT_PAM_SERVICE: &str = "xroad";

/// Whitelist entries that permit every IPv6 and IPv4 address.
pub const FULL_ACCESS_WHITELIST: [&str; 2] = ["::/0", "0.0.0.0/0"];

/// Loopback-only whitelist used for the key management entry point by default.
pub const LOOPBACK_WHITELIST: [&str; 2] = ["127.0.0.0/8", "::1"];

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON5 parsing error.
    #[error("Parse error: {0}")]
    Parse(#[from] json5::Error),

    /// Config validation error.
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Authentication gateway settings.
    #[serde(default)]
    pub auth: AuthSection,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Falls back to defaults when no config file exists.
    ///
    /// # Errors
    ///
    /// Returns error if config exists but cannot be loaded or parsed.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, parsed, or fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from a JSON5 string.
    ///
    /// # Errors
    ///
    /// Returns error if the text is not valid JSON5 or fails validation.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a path.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or file write fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        Self::state_dir().join("pamgate.json")
    }

    /// Get the pamgate state directory.
    ///
    /// Uses `PAMGATE_STATE_DIR` env var if set, otherwise `~/.pamgate`.
    #[must_use]
    pub fn state_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("PAMGATE_STATE_DIR") {
            PathBuf::from(dir)
        } else if let Some(home) = dirs::home_dir() {
            home.join(".pamgate")
        } else {
            PathBuf::from(".pamgate")
        }
    }

    /// Apply `PAMGATE_*` environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns error if an override has an invalid value.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns error if an override has an invalid value.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(service) = lookup("PAMGATE_PAM_SERVICE") {
            self.auth.pam_service = service;
        }

        if let Some(secs) = lookup("PAMGATE_BACKEND_TIMEOUT_SECS") {
            self.auth.backend_timeout_secs = secs.trim().parse().map_err(|_| {
                ConfigError::Validation(format!(
                    "PAMGATE_BACKEND_TIMEOUT_SECS is not a number: {secs}"
                ))
            })?;
        }

        if let Some(list) = lookup("PAMGATE_KEY_MANAGEMENT_WHITELIST") {
            self.auth.key_management_whitelist = split_entries(&list);
        }

        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.pam_service.trim().is_empty() {
            return Err(ConfigError::Validation(
                "PAM service name cannot be empty".to_string(),
            ));
        }

        if self.auth.backend_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "Backend timeout cannot be 0".to_string(),
            ));
        }

        let entries = self
            .auth
            .form_login_whitelist
            .iter()
            .chain(&self.auth.key_management_whitelist);
        for entry in entries {
            if entry.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "Whitelist entries cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Authentication gateway section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSection {
    /// PAM service (profile) name.
    #[serde(default = "default_pam_service")]
    pub pam_service: String,

    /// Upper bound for one backend round trip, in seconds.
    #[serde(default = "default_backend_timeout")]
    pub backend_timeout_secs: u64,

    /// Address ranges allowed to use the interactive login.
    #[serde(default = "default_form_login_whitelist")]
    pub form_login_whitelist: Vec<String>,

    /// Address ranges allowed to use the key management entry point.
    #[serde(default = "default_key_management_whitelist")]
    pub key_management_whitelist: Vec<String>,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            pam_service: default_pam_service(),
            backend_timeout_secs: default_backend_timeout(),
            form_login_whitelist: default_form_login_whitelist(),
            key_management_whitelist: default_key_management_whitelist(),
        }
    }
}

fn default_pam_service() -> String {
    DEFAULT_PAM_SERVICE.to_string()
}

const fn default_backend_timeout() -> u64 {
    10
}

fn default_form_login_whitelist() -> Vec<String> {
    FULL_ACCESS_WHITELIST.iter().map(ToString::to_string).collect()
}

fn default_key_management_whitelist() -> Vec<String> {
    LOOPBACK_WHITELIST.iter().map(ToString::to_string).collect()
}

/// Split a comma-separated whitelist into trimmed, non-empty entries.
#[must_use]
pub fn split_entries(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.auth.pam_service, "xroad");
        assert_eq!(config.auth.backend_timeout_secs, 10);
        assert_eq!(config.auth.form_login_whitelist, vec!["::/0", "0.0.0.0/0"]);
        assert_eq!(config.auth.key_management_whitelist, vec!["127.0.0.0/8", "::1"]);
    }

    #[test]
    fn test_parse_json5() {
        let config = Config::parse(
            r#"{
                // restricted management access
                auth: {
                    pamService: "login",
                    keyManagementWhitelist: ["10.0.0.0/8", "fd00::/8"],
                },
            }"#,
        )
        .unwrap();

        assert_eq!(config.auth.pam_service, "login");
        assert_eq!(config.auth.backend_timeout_secs, 10);
        assert_eq!(config.auth.key_management_whitelist, vec!["10.0.0.0/8", "fd00::/8"]);
        assert_eq!(config.auth.form_login_whitelist, vec!["::/0", "0.0.0.0/0"]);
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let result = Config::parse("{ auth: { backendTimeoutSecs: 0 } }");
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validation_rejects_empty_service() {
        let result = Config::parse(r#"{ auth: { pamService: "  " } }"#);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_parse_error() {
        let result = Config::parse("{ auth: ");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_overrides() {
        let vars = HashMap::from([
            ("PAMGATE_PAM_SERVICE", "sshd"),
            ("PAMGATE_BACKEND_TIMEOUT_SECS", " 3 "),
            ("PAMGATE_KEY_MANAGEMENT_WHITELIST", "192.168.0.0/16, ,::1"),
        ]);

        let config = Config::default()
            .with_overrides(|key| vars.get(key).map(ToString::to_string))
            .unwrap();

        assert_eq!(config.auth.pam_service, "sshd");
        assert_eq!(config.auth.backend_timeout_secs, 3);
        assert_eq!(config.auth.key_management_whitelist, vec!["192.168.0.0/16", "::1"]);
    }

    #[test]
    fn test_invalid_timeout_override() {
        let result = Config::default().with_overrides(|key| {
            (key == "PAMGATE_BACKEND_TIMEOUT_SECS").then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("pamgate.json");

        let mut config = Config::default();
        config.auth.pam_service = "custom".to_string();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.auth.pam_service, "custom");
        assert_eq!(loaded.auth.key_management_whitelist, config.auth.key_management_whitelist);
    }
}
