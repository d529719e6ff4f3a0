use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ClassificationRules;
use crate::outcome::{FallbackReason, Outcome};

/// Application-level constants
pub const APP_NAME: &str = "Surveilai";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Overrides the data directory (tests, portable installs).
pub const HOME_ENV: &str = "SURVEILAI_HOME";

const DB_FILE: &str = "surveilai.db";
const CONFIG_FILE: &str = "config.yaml";
const PENDING_FILE: &str = "pending.jsonl";

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "surveilai=info,surveilai_lib=info,warn"
}

/// Get the application data directory
/// ~/Surveilai/ unless `SURVEILAI_HOME` is set
pub fn app_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(HOME_ENV) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Get the case database path
pub fn database_path() -> PathBuf {
    app_data_dir().join(DB_FILE)
}

/// Cases accepted while the database was unavailable, one JSON object per line
pub fn pending_path() -> PathBuf {
    app_data_dir().join(PENDING_FILE)
}

/// Get the rule/alert configuration path
pub fn config_path() -> PathBuf {
    app_data_dir().join(CONFIG_FILE)
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Contents of `config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub classification_rules: ClassificationRules,
    pub alerts: AlertSettings,
}

/// Thresholds for the activity alert and the hotspot overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    pub recent_days: u32,
    pub high_activity_threshold: u32,
    /// Only cases with onset inside this many days are clustered.
    pub cluster_time_window_days: Option<u32>,
    pub cluster_radius_meters: f64,
    pub cluster_min_members: usize,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            recent_days: 7,
            high_activity_threshold: 10,
            cluster_time_window_days: None,
            cluster_radius_meters: 2000.0,
            cluster_min_members: 3,
        }
    }
}

/// Load `config.yaml`. Never fails: a missing file is replaced by the
/// defaults (written back to disk), an unreadable or unparseable one is
/// reported and the defaults are used for this session.
pub fn load_config(path: &Path) -> Outcome<AppConfig> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let config = AppConfig::default();
            if let Err(e) = save_config(path, &config) {
                tracing::warn!(path = %path.display(), error = %e, "Could not write default config");
            } else {
                tracing::info!(path = %path.display(), "Default config written");
            }
            return Outcome::fallback(config, FallbackReason::ConfigMissing);
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Config unreadable, using defaults");
            return Outcome::fallback(
                AppConfig::default(),
                FallbackReason::ConfigMalformed(e.to_string()),
            );
        }
    };

    match parse_config(&text) {
        Ok(config) => Outcome::success(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Config malformed, using defaults");
            Outcome::fallback(
                AppConfig::default(),
                FallbackReason::ConfigMalformed(e.to_string()),
            )
        }
    }
}

/// Parse configuration text. An empty document is the default config.
pub fn parse_config(text: &str) -> Result<AppConfig, ConfigError> {
    if text.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    Ok(serde_yaml::from_str(text)?)
}

pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(path, yaml)?;
    Ok(())
}

/// Admin editor path: the text is written verbatim. Returns the parse error,
/// if any, so the editor can warn; the next `load_config` will fall back.
pub fn save_raw_config(path: &Path, text: &str) -> Result<Option<ConfigError>, ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, text)?;
    let problem = parse_config(text).err();
    if let Some(ref e) = problem {
        tracing::warn!(path = %path.display(), error = %e, "Saved config does not parse");
    }
    Ok(problem)
}
