//! Configuration loading for capstan runs.
//!
//! Two levels, both optional: a project file at `.capstan/config.toml` and
//! a user file at `<config dir>/capstan/config.toml`. Missing files yield
//! defaults; partial files are filled in per-field via serde defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ErrorCode;

/// Errors loading a config file. Absent files are not errors — the
/// loaders return defaults for those.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config file {path}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::ConfigParseError
    }

    /// Optional remediation hint for operators and agents.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

/// Top-level capstan configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapstanConfig {
    #[serde(default)]
    pub lock: LockConfig,
}

/// Remote lock paths and soft-lock defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockConfig {
    /// Directory whose atomic creation is the hard lock.
    #[serde(default = "default_hard_lock_dir")]
    pub hard_lock_dir: String,
    /// Shared directory holding one file per soft lock.
    #[serde(default = "default_soft_lock_dir")]
    pub soft_lock_dir: String,
    /// Soft-lock expiry when the caller does not pass one (duration string).
    #[serde(default = "default_expiry")]
    pub default_expiry: String,
    /// Operation kinds a soft lock applies to when unspecified.
    #[serde(default = "default_ops")]
    pub default_ops: Vec<String>,
}

impl LockConfig {
    /// Path of the hard-lock metadata file inside the lock directory.
    #[must_use]
    pub fn hard_lock_file(&self) -> String {
        format!("{}/info", self.hard_lock_dir)
    }

    /// Path of the soft-lock record file for `id`.
    #[must_use]
    pub fn soft_lock_file(&self, id: &str) -> String {
        format!("{}/{id}", self.soft_lock_dir)
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            hard_lock_dir: default_hard_lock_dir(),
            soft_lock_dir: default_soft_lock_dir(),
            default_expiry: default_expiry(),
            default_ops: default_ops(),
        }
    }
}

/// Load the project-level config, or defaults when the file is absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(project_root: &Path) -> Result<CapstanConfig, ConfigError> {
    load_file(&project_root.join(".capstan/config.toml"))
}

/// Load the user-level config, or defaults when the file is absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<CapstanConfig, ConfigError> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(CapstanConfig::default());
    };
    load_file(&config_dir.join("capstan/config.toml"))
}

fn load_file(path: &Path) -> Result<CapstanConfig, ConfigError> {
    if !path.exists() {
        return Ok(CapstanConfig::default());
    }

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;

    toml::from_str::<CapstanConfig>(&content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

fn default_hard_lock_dir() -> String {
    "/tmp/capstan.lock".to_string()
}

fn default_soft_lock_dir() -> String {
    "/tmp/capstan.softlock.d".to_string()
}

fn default_expiry() -> String {
    "8h".to_string()
}

fn default_ops() -> Vec<String> {
    vec!["apply".to_string(), "run".to_string()]
}
