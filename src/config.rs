//! Configuration for a preference store.
//!
//! Sources, lowest to highest priority: built-in defaults, an optional TOML
//! file, then `PREFERENCES__*` environment variables
//! (e.g. `PREFERENCES__PATH=/home/lvuser/prefs.ini`).

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PreferencesError, Result};
use crate::table::DEFAULT_TABLE_NAME;

/// Default location of the preference file.
pub const DEFAULT_PATH: &str = "wpilib-preferences.ini";

const ENV_PREFIX: &str = "PREFERENCES";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferencesConfig {
    /// Preference file location.
    pub path: PathBuf,
    /// Name of the live table the store is mirrored into.
    pub table_name: String,
    /// Capacity of the change-notification channel.
    pub event_capacity: usize,
    /// fsync the file before it replaces the previous one.
    pub sync_writes: bool,
}

impl Default for PreferencesConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_PATH),
            table_name: DEFAULT_TABLE_NAME.to_string(),
            event_capacity: 1024,
            sync_writes: true,
        }
    }
}

impl PreferencesConfig {
    /// Load from defaults and the environment.
    pub fn load() -> Result<Self> {
        Self::build(None)
    }

    /// Load from defaults, a TOML file (if it exists), and the environment.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::build(Some(path.as_ref()))
    }

    fn build(file: Option<&Path>) -> Result<Self> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("path", defaults.path.to_string_lossy().into_owned())?
            .set_default("table_name", defaults.table_name)?
            .set_default("event_capacity", defaults.event_capacity as i64)?
            .set_default("sync_writes", defaults.sync_writes)?;

        if let Some(file) = file {
            builder = builder.add_source(File::from(file).format(FileFormat::Toml).required(false));
        }

        let config: Self = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the store cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.table_name.trim().is_empty() {
            return Err(PreferencesError::Config(config::ConfigError::Message(
                "table_name cannot be empty".to_string(),
            )));
        }
        if self.event_capacity == 0 {
            return Err(PreferencesError::Config(config::ConfigError::Message(
                "event_capacity must be at least 1".to_string(),
            )));
        }
        Ok(())
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }
}
