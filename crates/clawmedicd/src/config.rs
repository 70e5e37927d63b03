//! Configuration management for clawmedicd.
//!
//! Loads settings from `--config`, else /etc/clawmedic/config.toml, else
//! defaults. The AI key is taken from `CLAWMEDIC_AI_KEY` when set.

use anyhow::{Context, Result};
use clawmedic_common::augmentor::AugmentorConfig;
use clawmedic_common::ledger::LEDGER_DB_PATH;
use clawmedic_common::store::DEFAULT_CAPACITY;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// System-wide config file path
pub const CONFIG_PATH: &str = "/etc/clawmedic/config.toml";

/// Environment variable holding the AI provider key
pub const AI_KEY_ENV: &str = "CLAWMEDIC_AI_KEY";

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address; loopback by default
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Request body limit for /v1/diagnose
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_bind() -> String {
    "127.0.0.1:7878".to_string()
}

fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// In-memory result store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

/// Fix ledger settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_enabled")]
    pub enabled: bool,

    #[serde(default = "default_ledger_path")]
    pub path: String,
}

fn default_ledger_enabled() -> bool {
    true
}

fn default_ledger_path() -> String {
    LEDGER_DB_PATH.to_string()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            enabled: default_ledger_enabled(),
            path: default_ledger_path(),
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub ai: AugmentorConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,
}

impl Config {
    /// Load from an explicit path (errors are fatal), else the system path,
    /// else defaults. The environment key is applied last.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from_path(path)?,
            None => Self::load_from_path(Path::new(CONFIG_PATH)).unwrap_or_else(|e| {
                warn!("Config not loaded ({}), using defaults", e);
                Config::default()
            }),
        };

        if let Ok(key) = std::env::var(AI_KEY_ENV) {
            config.apply_api_key(key);
        }

        Ok(config)
    }

    /// Load config from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Non-blank keys override the file's `[ai] api_key`
    pub fn apply_api_key(&mut self, key: String) {
        let key = key.trim();
        if !key.is_empty() {
            self.ai.api_key = Some(key.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.bind, "127.0.0.1:7878");
        assert_eq!(config.store.capacity, 1000);
        assert!(!config.ai.enabled);
        assert!(config.ledger.enabled);
        assert_eq!(config.ledger.path, LEDGER_DB_PATH);
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml_str = r#"
[ai]
enabled = true
model = "gpt-4.1-mini"
timeout_secs = 10

[store]
capacity = 50
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.ai.enabled);
        assert_eq!(config.ai.model, "gpt-4.1-mini");
        assert_eq!(config.ai.timeout_secs, 10);
        assert_eq!(config.ai.endpoint, "https://api.openai.com");
        assert_eq!(config.store.capacity, 50);
        assert_eq!(config.server.bind, "127.0.0.1:7878");
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nbind = \"0.0.0.0:9000\"").unwrap();
        let config = Config::load_from_path(file.path()).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
    }

    #[test]
    fn test_load_explicit_missing_is_error() {
        assert!(Config::load(Some(Path::new("/nonexistent/clawmedic.toml"))).is_err());
    }

    #[test]
    fn test_apply_api_key_ignores_blank() {
        let mut config = Config::default();
        config.apply_api_key("   ".to_string());
        assert!(config.ai.api_key.is_none());
        config.apply_api_key(" sk-test ".to_string());
        assert_eq!(config.ai.api_key.as_deref(), Some("sk-test"));
    }
}
