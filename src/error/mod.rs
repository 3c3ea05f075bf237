use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = ConfigError> = std::result::Result<T, E>;

/// Errors raised while discovering, loading or regenerating CNI configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The explicitly configured master plugin file does not exist
    #[error("primary CNI plugin configuration {path} not found")]
    PrimaryPluginNotFound { path: PathBuf },

    /// Auto-discovery found no candidate configuration file
    #[error("no primary CNI plugin configuration found in {dir}")]
    NoPrimaryPluginFound { dir: PathBuf },

    /// The primary plugin would be the generated shim file itself
    #[error("cannot use {path} as the primary CNI configuration to avoid reading recursively")]
    RecursiveShimConfig { path: PathBuf },

    #[error("malformed CNI configuration {path}: {reason}")]
    MalformedConfig { path: PathBuf, reason: String },

    #[error("delegate cni version is {delegate} while top level cni version is {top_level}")]
    VersionMismatch { delegate: String, top_level: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to watch CNI configuration directory: {0}")]
    Watch(#[from] notify::Error),

    #[error("failed to load the primary CNI configuration as a multus delegate with error '{0}'")]
    LoadPrimaryConfig(Box<ConfigError>),

    #[error("the primary CNI configuration does not feature the network name")]
    MissingNetworkName,

    #[error("configuration manager is already watching")]
    AlreadyStarted,

    #[error("configuration manager has been stopped")]
    Stopped,

    #[error("configuration manager must be started from within a tokio runtime")]
    NoRuntime,
}

impl ConfigError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ConfigError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        ConfigError::MalformedConfig {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// The underlying cause, looking through the construction wrapper
    pub fn root(&self) -> &ConfigError {
        match self {
            ConfigError::LoadPrimaryConfig(inner) => inner.root(),
            other => other,
        }
    }

    /// True when the error means the file is simply gone
    pub fn is_not_found(&self) -> bool {
        match self.root() {
            ConfigError::Io { source, .. } => source.kind() == io::ErrorKind::NotFound,
            ConfigError::PrimaryPluginNotFound { .. } | ConfigError::NoPrimaryPluginFound { .. } => {
                true
            }
            _ => false,
        }
    }
}
