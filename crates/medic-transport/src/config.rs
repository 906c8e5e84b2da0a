//! Transport configuration.
//!
//! Configuration priority: ~/.config/medic/config.toml > environment
//! variables > built-in development defaults.

use medic_core::{MedicError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_CHANNEL_URL: &str = "ws://127.0.0.1:8000/socket.io";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Endpoints and limits for the diagnosis-service collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Base URL of the request/response API.
    pub api_url: String,
    /// URL of the bidirectional event channel.
    pub channel_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            channel_url: DEFAULT_CHANNEL_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl TransportConfig {
    /// Loads configuration from the user config file or the environment.
    ///
    /// The config file wins when present and readable; otherwise the
    /// `MEDIC_API_URL` / `MEDIC_CHANNEL_URL` / `MEDIC_TIMEOUT_SECS`
    /// environment variables override the defaults field by field.
    pub fn load() -> Self {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                match Self::from_path(&path) {
                    Ok(config) => return config,
                    Err(err) => {
                        tracing::warn!("Failed to load {}: {}", path.display(), err);
                    }
                }
            }
        }

        Self::from_env()
    }

    /// Builds a configuration from environment variables over the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = env::var("MEDIC_API_URL") {
            config.api_url = url;
        }
        if let Ok(url) = env::var("MEDIC_CHANNEL_URL") {
            config.channel_url = url;
        }
        if let Ok(secs) = env::var("MEDIC_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                config.timeout_secs = secs;
            }
        }
        config
    }

    /// Reads a configuration from a TOML file.
    ///
    /// Missing fields fall back to the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| MedicError::config(format!("cannot read {}: {}", path.display(), err)))?;
        toml::from_str(&raw).map_err(|err| MedicError::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        })
    }

    /// Returns the user config file location, when a config dir exists.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("medic").join("config.toml"))
    }

    /// Returns the per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_point_at_the_development_server() {
        let config = TransportConfig::default();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn config_file_overrides_win() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "api_url = \"https://medic.example.com\"\ntimeout_secs = 5"
        )
        .unwrap();

        let config = TransportConfig::from_path(file.path()).unwrap();
        assert_eq!(config.api_url, "https://medic.example.com");
        assert_eq!(config.timeout_secs, 5);
        // Fields the file omits keep their defaults.
        assert_eq!(config.channel_url, DEFAULT_CHANNEL_URL);
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("config.toml");
        assert!(TransportConfig::from_path(&missing).is_err());
    }
}
