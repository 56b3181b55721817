// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the zcm configuration file to simplify the process
//! of serialization and deserialization.
//!
//! # General Layout
//!
//! The configuration file has two sections. The `zfs` section tells zcm how
//! to reach the backend. The `retention` section holds the default retention
//! policy applied to every manager, which command line flags may override
//! field by field.
//!
//! ```toml
//! [zfs]
//! command = "zfs"
//!
//! [retention]
//! max_older = 10
//! max_newer = 2
//! auto_remove = false
//! ```

use crate::manager::retention::RetentionPolicy;

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

/// Full configuration file layout.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// How to run the backend.
    pub zfs: ZfsSettings,

    /// Default retention policy.
    pub retention: RetentionSettings,
}

impl Settings {
    /// Load settings from file, falling back to defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if file exists but cannot be read.
    /// - Return any parse error of [`Settings::from_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(data) => data.parse(),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!("no configuration at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                source: source.into(),
                path: path.to_path_buf(),
            }),
        }
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on backend command.
        settings.zfs.command = PathBuf::from(
            shellexpand::full(settings.zfs.command.to_string_lossy().as_ref())
                .map_err(ConfigError::ShellExpansion)?
                .into_owned(),
        );

        Ok(settings)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Backend settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ZfsSettings {
    /// Path or name of the `zfs` binary.
    pub command: PathBuf,
}

impl Default for ZfsSettings {
    fn default() -> Self {
        Self {
            command: PathBuf::from("zfs"),
        }
    }
}

/// Retention defaults.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetentionSettings {
    /// Maximum number of clones older than the active clone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_older: Option<usize>,

    /// Maximum number of clones newer than the active clone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_newer: Option<usize>,

    /// Maximum number of clones overall.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_total: Option<usize>,

    /// Evict clones automatically instead of rejecting operations.
    pub auto_remove: bool,
}

impl RetentionSettings {
    /// Configured caps as a retention policy.
    pub fn policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_older: self.max_older,
            max_newer: self.max_newer,
            max_total: self.max_total,
        }
    }
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Failed to read configuration file.
    #[error("failed to read configuration file {:?}", path.display())]
    Read {
        #[source]
        source: std::sync::Arc<io::Error>,
        path: PathBuf,
    },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
