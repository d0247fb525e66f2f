//! Global configuration parsing, validation, and launch-profile loading.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Timing knobs (seconds) for session establishment and teardown.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// How long to wait for a start event corroborating a requested session.
    #[serde(default = "default_establishment_seconds")]
    pub establishment_seconds: u64,
    /// Grace period a stopped process gets before it is force-killed.
    #[serde(default = "default_stop_grace_seconds")]
    pub stop_grace_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            establishment_seconds: default_establishment_seconds(),
            stop_grace_seconds: default_stop_grace_seconds(),
        }
    }
}

fn default_establishment_seconds() -> u64 {
    10
}

fn default_stop_grace_seconds() -> u64 {
    5
}

fn default_event_channel_capacity() -> usize {
    64
}

fn default_debugger_type() -> String {
    "process".into()
}

/// The root session entry of a launch profile.
///
/// A root without a `program` is a pure coordinator session: it exists so
/// children have a parent to cascade under, and terminates only when asked.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RootProfile {
    /// Display name of the root session.
    pub name: String,
    /// Optional program to run as the root session itself.
    #[serde(default)]
    pub program: Option<PathBuf>,
    /// Arguments for the root program.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment overrides for the root program.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory for the root program.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

/// One service launched as a child of the root session.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ServiceProfile {
    /// Display name of the service session.
    pub name: String,
    /// Program to launch for this service.
    pub program: PathBuf,
    /// Arguments for the service program.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment overrides for the service program.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory for the service program.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Marks the primary process whose termination ends the whole launch.
    #[serde(default)]
    pub app_host: bool,
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Debugger backend identifier stamped onto generated session configs.
    #[serde(default = "default_debugger_type")]
    pub debugger_type: String,
    /// Bounded capacity of the host event channel.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
    /// Establishment and teardown timing.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Root session of the coordinated launch.
    pub root: RootProfile,
    /// Services launched as children of the root.
    #[serde(default)]
    pub services: Vec<ServiceProfile>,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Establishment wait as a [`Duration`].
    #[must_use]
    pub fn establishment_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.establishment_seconds)
    }

    /// Stop grace period as a [`Duration`].
    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.timeouts.stop_grace_seconds)
    }

    fn validate(&self) -> Result<()> {
        if self.root.name.trim().is_empty() {
            return Err(AppError::Config("root.name must not be empty".into()));
        }

        if self.timeouts.establishment_seconds == 0 {
            return Err(AppError::Config(
                "timeouts.establishment_seconds must be greater than zero".into(),
            ));
        }

        if self.event_channel_capacity == 0 {
            return Err(AppError::Config(
                "event_channel_capacity must be greater than zero".into(),
            ));
        }

        let app_hosts = self.services.iter().filter(|s| s.app_host).count();
        if app_hosts > 1 {
            return Err(AppError::Config(
                "at most one service may set app_host = true".into(),
            ));
        }

        for service in &self.services {
            if service.name.trim().is_empty() {
                return Err(AppError::Config("service name must not be empty".into()));
            }
        }

        Ok(())
    }
}
