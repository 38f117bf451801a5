//! Application configuration.
//!
//! Loaded from `<config dir>/authcode/config.json`. Every field has a
//! default, so a missing or partial file is fine; a broken one is reported
//! and replaced by defaults.

use authcode_totp::totp::{TotpError, TotpErrorKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "authcode";
const CONFIG_FILE: &str = "config.json";
const HISTORY_FILE: &str = "history.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// History file; `None` means the platform data directory.
    pub history_path: Option<PathBuf>,
    /// Start with codes and seeds masked.
    pub privacy_mode: bool,
    /// Default for `--reveal` on new entries.
    pub reveal_secret_by_default: bool,
    /// Log filter used when `AUTHCODE_LOG` is not set.
    pub log_level: String,
    /// Countdown tick interval in milliseconds.
    pub tick_millis: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            history_path: None,
            privacy_mode: false,
            reveal_secret_by_default: false,
            log_level: "info".to_string(),
            tick_millis: 1000,
        }
    }
}

impl AppConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(APP_DIR).join(CONFIG_FILE))
    }

    pub fn default_history_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join(HISTORY_FILE)
    }

    /// Read and parse `path`. A missing file yields defaults.
    pub fn try_load_from(path: &Path) -> Result<Self, TotpError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|e| {
            TotpError::new(TotpErrorKind::Config, "Failed to read config file")
                .with_detail(format!("{}: {}", path.display(), e))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            TotpError::new(TotpErrorKind::Config, "Invalid config file")
                .with_detail(format!("{}: {}", path.display(), e))
        })
    }

    /// Load from `path` (or the default location), falling back to
    /// defaults on any error. The error, if any, is returned for logging
    /// once a subscriber is installed.
    pub fn load(path: Option<&Path>) -> (Self, Option<TotpError>) {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(p) => p,
            None => return (Self::default(), None),
        };
        match Self::try_load_from(&path) {
            Ok(config) => (config, None),
            Err(e) => (Self::default(), Some(e)),
        }
    }

    pub fn resolved_history_path(&self) -> PathBuf {
        self.history_path
            .clone()
            .unwrap_or_else(Self::default_history_path)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis.max(1))
    }
}
