use crate::app_dirs::AppDirs;
use crate::error::ConfigError;
use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::weakness::AnalyzerSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StoreBackend {
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub slow_threshold_ms: f64,
    pub error_rate_threshold: f64,
    pub max_sessions_to_analyze: usize,
    pub ranked_keys_limit: usize,
    pub critical_keys_per_list: usize,
    pub history_capacity: usize,
    pub store_backend: StoreBackend,
}

impl Default for Config {
    fn default() -> Self {
        let analyzer = AnalyzerSettings::default();
        Self {
            slow_threshold_ms: analyzer.slow_threshold_ms,
            error_rate_threshold: analyzer.error_rate_threshold,
            max_sessions_to_analyze: analyzer.max_sessions_to_analyze,
            ranked_keys_limit: analyzer.ranked_keys_limit,
            critical_keys_per_list: analyzer.critical_keys_per_list,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            store_backend: StoreBackend::Sqlite,
        }
    }
}

impl From<&Config> for AnalyzerSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            slow_threshold_ms: cfg.slow_threshold_ms,
            error_rate_threshold: cfg.error_rate_threshold,
            max_sessions_to_analyze: cfg.max_sessions_to_analyze,
            ranked_keys_limit: cfg.ranked_keys_limit,
            critical_keys_per_list: cfg.critical_keys_per_list,
        }
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> Result<(), ConfigError>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = AppDirs::config_path().unwrap_or_else(|| PathBuf::from("keycoach_config.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    /// Missing or unreadable files fall back to defaults
    fn load(&self) -> Config {
        let Ok(bytes) = fs::read(&self.path) else {
            return Config::default();
        };
        match serde_json::from_slice::<Config>(&bytes) {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "ignoring malformed config");
                Config::default()
            }
        }
    }

    fn save(&self, cfg: &Config) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}
