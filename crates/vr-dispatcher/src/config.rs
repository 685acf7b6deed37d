//! Configuration file support for vr-dispatcherd
//!
//! Loads and validates dispatcher configuration from TOML files.
//! Default location: /etc/vr-dispatcher/dispatcher.toml

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use vr_transport::SshConfig;

use crate::aggregation::DEFAULT_CONFIG_VERSION;
use crate::error::{DispatchError, DispatchResult};
use crate::timeout::TimeoutPolicy;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/vr-dispatcher/dispatcher.toml";

/// Dispatcher timeouts and aggregate document settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Base timeout for a single remote operation
    #[serde(default = "default_script_timeout")]
    pub script_timeout_secs: u64,

    /// Extra time per expected answer in an aggregated batch
    #[serde(default = "default_aggregation_each_timeout")]
    pub aggregation_each_timeout_secs: u64,

    #[serde(default = "default_aggregation_min_timeout")]
    pub aggregation_min_timeout_secs: u64,

    #[serde(default = "default_keystore_timeout")]
    pub keystore_timeout_secs: u64,

    /// Version tag written into aggregate documents
    #[serde(default = "default_config_version")]
    pub config_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Complete vr-dispatcherd configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    #[serde(default)]
    pub transport: SshConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

// Default functions
fn default_script_timeout() -> u64 {
    600
}

fn default_aggregation_each_timeout() -> u64 {
    600
}

fn default_aggregation_min_timeout() -> u64 {
    120
}

fn default_keystore_timeout() -> u64 {
    900
}

fn default_config_version() -> String {
    DEFAULT_CONFIG_VERSION.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            script_timeout_secs: default_script_timeout(),
            aggregation_each_timeout_secs: default_aggregation_each_timeout(),
            aggregation_min_timeout_secs: default_aggregation_min_timeout(),
            keystore_timeout_secs: default_keystore_timeout(),
            config_version: default_config_version(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl DispatcherConfig {
    pub fn timeout_policy(&self) -> TimeoutPolicy {
        TimeoutPolicy {
            script: Duration::from_secs(self.script_timeout_secs),
            aggregation_each: Duration::from_secs(self.aggregation_each_timeout_secs),
            aggregation_floor: Duration::from_secs(self.aggregation_min_timeout_secs),
            keystore: Duration::from_secs(self.keystore_timeout_secs),
        }
    }
}

impl AppConfig {
    /// Reads a config file. Returns `None` if the file does not exist.
    ///
    /// Nothing is logged here, so this can run before the subscriber that
    /// the file configures is installed.
    pub fn read_file(path: impl AsRef<Path>) -> DispatchResult<Option<Self>> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map(Some).map_err(|e| {
                DispatchError::config(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DispatchError::Io(e)),
        }
    }

    pub fn timeout_policy(&self) -> TimeoutPolicy {
        self.dispatcher.timeout_policy()
    }

    /// Validate configuration
    pub fn validate(&self) -> DispatchResult<()> {
        let timeouts = [
            ("script_timeout_secs", self.dispatcher.script_timeout_secs),
            (
                "aggregation_each_timeout_secs",
                self.dispatcher.aggregation_each_timeout_secs,
            ),
            (
                "aggregation_min_timeout_secs",
                self.dispatcher.aggregation_min_timeout_secs,
            ),
            ("keystore_timeout_secs", self.dispatcher.keystore_timeout_secs),
            ("connect_timeout_secs", self.transport.connect_timeout_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(DispatchError::config(format!("{} must be > 0", name)));
        }

        if self.dispatcher.config_version.trim().is_empty() {
            return Err(DispatchError::config("config_version must not be empty"));
        }

        if self.transport.ssh_port == 0 {
            return Err(DispatchError::config("ssh_port must be > 0"));
        }

        if self.transport.script_dir.is_empty() {
            return Err(DispatchError::config("script_dir must not be empty"));
        }

        Ok(())
    }
}
