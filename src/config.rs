//! Runtime configuration using Figment.
//!
//! Configuration is loaded from:
//! 1. a TOML file (`config/daq_actors.toml` by default)
//! 2. environment variables prefixed with `DAQ_ACTORS_`, nested with `__`
//!    (e.g. `DAQ_ACTORS_ACTORS__SHUTDOWN_TIMEOUT_MS=1000`)
//!
//! Every field has a default, so a missing file yields [`RuntimeConfig::default`].
//!
//! # Example
//! ```no_run
//! use daq_actors::config::RuntimeConfig;
//!
//! let config = RuntimeConfig::load()?;
//! config.validate()?;
//! println!("Application: {}", config.application.name);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::error::DaqError;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/daq_actors.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Actor runtime settings
    pub actors: ActorConfig,
    /// Run persistence settings
    pub storage: StorageConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Version of the application's actor set, stamped into snapshots
    pub user_version: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "DAQ Actors".to_string(),
            log_level: "info".to_string(),
            user_version: "0.0.0".to_string(),
        }
    }
}

/// Actor runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorConfig {
    /// Per-actor shutdown acknowledgement timeout in milliseconds (0 = wait forever)
    pub shutdown_timeout_ms: u64,
    /// Per-actor prepare timeout in milliseconds (0 = wait forever)
    pub prepare_timeout_ms: u64,
    /// Timeout for a running actor to answer a state request, in milliseconds
    pub state_timeout_ms: u64,
    /// Capacity of the lifecycle event channel
    pub event_capacity: usize,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: 5000,
            prepare_timeout_ms: 5000,
            state_timeout_ms: 1000,
            event_capacity: 64,
        }
    }
}

/// Run persistence configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Default save format (json, csv, forget)
    pub default_format: String,
    /// Output directory for saved runs and snapshots
    pub output_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            default_format: "json".to_string(),
            output_dir: PathBuf::from("data"),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from the default file and environment variables
    pub fn load() -> Result<Self, DaqError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, DaqError> {
        Self::figment(path.as_ref()).extract().map_err(DaqError::from)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(RuntimeConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("DAQ_ACTORS_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), DaqError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = crate::data::storage_factory::KNOWN_FORMATS;
        if !valid_formats.contains(&self.storage.default_format.as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid storage format '{}'. Must be one of: {}",
                self.storage.default_format,
                valid_formats.join(", ")
            )));
        }

        if self.actors.event_capacity == 0 {
            return Err(DaqError::Configuration(
                "actors.event_capacity must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
