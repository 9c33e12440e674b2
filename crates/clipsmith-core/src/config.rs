use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::DEFAULT_SILENCE_THRESHOLD;

pub const CONFIG_FILE_NAME: &str = "clipsmith.config.toml";
pub const CONFIG_PATH_ENV: &str = "CLIPSMITH_CONFIG_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EditorConfig {
    pub storage: StorageConfig,
    pub editing: EditingConfig,
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub asset_root: PathBuf,
    /// Relative paths resolve against `asset_root`.
    pub backup_dir: PathBuf,
    /// Relative paths resolve against `asset_root`.
    pub settings_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EditingConfig {
    pub debounce_seconds: f32,
    pub silence_threshold: f32,
    pub batch_parallel: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub log_dir: PathBuf,
    pub rust_log_filter: String,
    pub trace_file_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("assets"),
            backup_dir: PathBuf::from(".clipsmith/originals"),
            settings_path: PathBuf::from(".clipsmith/settings.json"),
        }
    }
}

impl Default for EditingConfig {
    fn default() -> Self {
        Self {
            debounce_seconds: 0.5,
            silence_threshold: DEFAULT_SILENCE_THRESHOLD,
            batch_parallel: false,
        }
    }
}

impl EditingConfig {
    /// `debounce_seconds` as a duration; zero when it is negative or not finite.
    #[must_use]
    pub fn debounce_delay(&self) -> Duration {
        Duration::try_from_secs_f32(self.debounce_seconds).unwrap_or(Duration::ZERO)
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            rust_log_filter: "info,clipsmith_core=debug".to_string(),
            trace_file_prefix: "clipsmith".to_string(),
        }
    }
}

impl EditorConfig {
    /// Loads the discovered config file, failing when none exists.
    pub fn load() -> Result<Self> {
        let config_path = discover_config_path().with_context(|| {
            format!("failed to locate {CONFIG_FILE_NAME}; looked in cwd and parent directory")
        })?;
        Self::load_from(&config_path)
    }

    /// Loads the discovered config file, or defaults when none exists.
    pub fn load_or_default() -> Result<Self> {
        match discover_config_path() {
            Ok(path) => Self::load_from(&path),
            Err(_) => {
                debug!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("failed to parse config TOML from {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    #[must_use]
    pub fn backup_dir(&self) -> PathBuf {
        self.storage.asset_root.join(&self.storage.backup_dir)
    }

    #[must_use]
    pub fn settings_path(&self) -> PathBuf {
        self.storage.asset_root.join(&self.storage.settings_path)
    }
}

fn discover_config_path() -> Result<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Ok(path);
        }
    }

    let cwd = env::current_dir().context("failed to resolve current directory")?;
    let candidates = [
        cwd.join(CONFIG_FILE_NAME),
        cwd.join("..").join(CONFIG_FILE_NAME),
    ];

    candidates
        .into_iter()
        .find(|path| path.is_file())
        .ok_or_else(|| anyhow::anyhow!("{CONFIG_FILE_NAME} not found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EditorConfig::from_toml(
            r#"
            [storage]
            asset_root = "game/audio"

            [editing]
            silence_threshold = 0.1
            "#,
        )
        .expect("config should parse");

        assert_eq!(config.storage.asset_root, PathBuf::from("game/audio"));
        assert_eq!(config.editing.silence_threshold, 0.1);
        assert_eq!(config.editing.debounce_seconds, 0.5);
        assert_eq!(config.diagnostics, DiagnosticsConfig::default());
    }

    #[test]
    fn relative_store_paths_follow_asset_root() {
        let mut config = EditorConfig::default();
        config.storage.asset_root = PathBuf::from("/srv/project/audio");
        assert_eq!(
            config.backup_dir(),
            PathBuf::from("/srv/project/audio/.clipsmith/originals")
        );

        config.storage.settings_path = PathBuf::from("/var/lib/clipsmith/settings.json");
        assert_eq!(
            config.settings_path(),
            PathBuf::from("/var/lib/clipsmith/settings.json")
        );
    }

    #[test]
    fn debounce_delay_tolerates_bad_values() {
        let mut editing = EditingConfig::default();
        assert_eq!(editing.debounce_delay(), Duration::from_millis(500));
        editing.debounce_seconds = -1.0;
        assert_eq!(editing.debounce_delay(), Duration::ZERO);
        editing.debounce_seconds = f32::NAN;
        assert_eq!(editing.debounce_delay(), Duration::ZERO);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(EditorConfig::from_toml("[editing\nsilence_threshold = ").is_err());
    }
}
