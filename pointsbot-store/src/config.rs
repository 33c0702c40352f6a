use serde::Deserialize;
use std::{env, fs, io, ops::RangeInclusive, path::Path};

pub const DEFAULT_DB_PATH: &str = "data/points.db";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite database file; `DB_PATH` takes precedence.
    pub database_path: String,
    pub activity: ActivityConfig,
}

/// Points handed out for chat activity.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    pub min_award: i32,
    pub max_award: i32,
    pub flush_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: DEFAULT_DB_PATH.to_string(),
            activity: ActivityConfig::default(),
        }
    }
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            min_award: 7,
            max_award: 25,
            flush_interval_secs: 60,
        }
    }
}

impl ActivityConfig {
    pub fn award_range(&self) -> RangeInclusive<i32> {
        self.min_award..=self.max_award
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl AppConfig {
    /// Loads `CONFIG_PATH` (default `config.yaml`). A missing file yields the
    /// defaults; `DB_PATH` overrides the database path either way.
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
        let mut cfg = match Self::load_from_path(&path) {
            Ok(cfg) => cfg,
            Err(ConfigError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(%path, "no config file; using defaults");
                AppConfig::default()
            }
            Err(e) => return Err(e),
        };
        if let Ok(db_path) = env::var("DB_PATH") {
            cfg.database_path = db_path;
        }
        Ok(cfg)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(&path)?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let cfg: AppConfig = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let a = &self.activity;
        if a.min_award <= 0 || a.max_award < a.min_award {
            return Err(ConfigError::Invalid(format!(
                "activity award range {}..={} must be positive and non-empty",
                a.min_award, a.max_award
            )));
        }
        if a.flush_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "activity.flush_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
