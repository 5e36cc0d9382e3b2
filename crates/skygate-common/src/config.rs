//! Gateway Configuration
//!
//! Settings are read from the environment with optional overrides from a JSON
//! config file (`BSKY_CONFIG_FILE` or an explicit path). File values win over
//! environment values, matching the precedence operators expect when mounting
//! a config file into a container.
//!
//! Recognized environment variables:
//!
//! | Variable | Meaning |
//! |---|---|
//! | `BSKY_ID` | primary account identifier |
//! | `BSKY_PASSWORD` | primary account secret |
//! | `BSKY_HOST` | upstream host (default `https://bsky.social`) |
//! | `BSKY_BACKUP_ID` / `BSKY_BACKUP_PASSWORD` | optional backup credentials |
//! | `BSKY_CONFIG_FILE` | optional JSON config file path |
//! | `MOCK_MODE` | `1`/`true` marks the process as running without upstream |

use std::path::Path;

use serde::Deserialize;

use crate::protocol::error::{GatewayError, Result};

/// Default upstream host when `BSKY_HOST` is unset.
pub const DEFAULT_HOST: &str = "https://bsky.social";

/// Resolved gateway configuration.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Account identifier used for session creation
    pub identifier: String,
    /// Account secret used for session creation
    pub secret: String,
    /// Upstream AT Protocol host, scheme included
    pub host: String,
    /// Whether the process runs without a real upstream
    pub mock_mode: bool,
}

/// Alternative credentials tried when the primary account fails.
///
/// Entries without a host inherit the primary host at use time.
#[derive(Debug, Clone)]
pub struct BackupCredentials {
    pub identifier: String,
    pub secret: String,
    pub host: Option<String>,
}

/// On-disk config file shape. Field names follow the historical JSON layout.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(rename = "BskyID", default)]
    identifier: String,
    #[serde(rename = "BskyPassword", default)]
    secret: String,
    #[serde(rename = "BskyHost", default)]
    host: String,
}

impl AppConfig {
    /// Loads configuration from the environment, applying file overrides when
    /// `BSKY_CONFIG_FILE` points at a readable JSON file.
    pub fn load() -> Self {
        let mut cfg = Self::from_env();
        if let Ok(path) = std::env::var("BSKY_CONFIG_FILE") {
            if !path.is_empty() {
                cfg.apply_file_overrides(Path::new(&path));
            }
        }
        cfg
    }

    /// Loads configuration from the environment, then applies overrides from
    /// an explicit file path.
    pub fn load_with_file(path: &Path) -> Self {
        let mut cfg = Self::from_env();
        cfg.apply_file_overrides(path);
        cfg
    }

    fn from_env() -> Self {
        let mock = std::env::var("MOCK_MODE")
            .map(|v| v == "1" || v == "true")
            .unwrap_or(false);
        Self {
            identifier: env_or("BSKY_ID", ""),
            secret: env_or("BSKY_PASSWORD", ""),
            host: env_or("BSKY_HOST", DEFAULT_HOST),
            mock_mode: mock,
        }
    }

    fn apply_file_overrides(&mut self, path: &Path) {
        let file_cfg = match read_file_config(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable config file");
                return;
            }
        };
        if !file_cfg.identifier.is_empty() {
            self.identifier = file_cfg.identifier;
        }
        if !file_cfg.secret.is_empty() {
            self.secret = file_cfg.secret;
        }
        if !file_cfg.host.is_empty() {
            self.host = file_cfg.host;
        }
    }

    /// Validates that the configuration can drive an authenticated gateway.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "missing upstream host in configuration".into(),
            ));
        }
        if self.identifier.is_empty() || self.secret.is_empty() {
            return Err(GatewayError::MissingCredentials);
        }
        Ok(())
    }

    /// Reads optional backup credentials from the environment.
    pub fn backup_from_env() -> Option<BackupCredentials> {
        let identifier = std::env::var("BSKY_BACKUP_ID").ok()?;
        let secret = std::env::var("BSKY_BACKUP_PASSWORD").ok()?;
        if identifier.is_empty() || secret.is_empty() {
            return None;
        }
        Some(BackupCredentials {
            identifier,
            secret,
            host: None,
        })
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let data = std::fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}

fn env_or(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}
