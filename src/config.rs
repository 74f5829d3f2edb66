//! Configuration loaded from `dms.toml`.
//!
//! Every section and key is optional; a missing file yields the defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::generator::{GenerationOptions, DEFAULT_MAX_CATCH_UP};
use crate::lifecycle::DEFAULT_DUE_SOON_DAYS;

pub const CONFIG_FILE: &str = "dms.toml";
pub const STORE_FILE: &str = "dms.json";
pub const PREFS_FILE: &str = "prefs.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub generation: GenerationConfig,
    pub lifecycle: LifecycleConfig,
    pub logging: LoggingConfig,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

/// Bearer token to user email.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub tokens: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub max_catch_up: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_catch_up: DEFAULT_MAX_CATCH_UP,
        }
    }
}

impl GenerationConfig {
    pub fn options(&self) -> GenerationOptions {
        GenerationOptions {
            max_catch_up: self.max_catch_up,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub due_soon_days: i64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            due_soon_days: DEFAULT_DUE_SOON_DAYS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Email of the user a bearer token belongs to.
    pub fn email_for_token(&self, token: &str) -> Option<&str> {
        self.auth.tokens.get(token).map(String::as_str)
    }
}

/// `~/.dms`, or the current directory when no home directory is known.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".dms"))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.generation.max_catch_up, DEFAULT_MAX_CATCH_UP);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = Config::parse(
            r#"
            [server]
            bind = "0.0.0.0:9000"

            [auth.tokens]
            "tok-ops" = "ops@plant.example"

            [lifecycle]
            due_soon_days = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.email_for_token("tok-ops"), Some("ops@plant.example"));
        assert_eq!(config.email_for_token("nope"), None);
        assert_eq!(config.lifecycle.due_soon_days, 5);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.client, ClientConfig::default());
    }

    #[test]
    fn bad_toml_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[server\nbind = 1").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config file"));
    }
}
