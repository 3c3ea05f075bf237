use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

/// Network name of the generated shim unless configured otherwise
pub const DEFAULT_NETWORK_NAME: &str = "multus-cni-network";

/// File name of the generated shim configuration
pub const MULTUS_CONFIG_FILE_NAME: &str = "00-multus.conf";

pub const DEFAULT_AUTOCONFIG_DIR: &str = "/host/etc/cni/net.d";
pub const DEFAULT_CNI_CONFIG_DIR: &str = "/host/etc/cni/net.d";

/// Top-level meta-plugin configuration.
///
/// Loaded once at process start and never re-read by the manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultusConfig {
    /// Name of the generated shim network
    #[serde(default = "default_network_name")]
    pub name: String,
    /// CNI version the meta-plugin declares
    #[serde(rename = "cniVersion")]
    pub cni_version: String,
    /// Directory scanned for the primary plugin configuration
    #[serde(rename = "multusAutoconfigDir", default = "default_autoconfig_dir")]
    pub autoconfig_dir: PathBuf,
    /// Explicit primary plugin file name inside the autoconfig directory
    #[serde(
        rename = "multusMasterCNI",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub master_cni_file_name: Option<String>,
    /// Rewrite the delegate's version instead of rejecting a mismatch
    #[serde(rename = "forceCNIVersion", default)]
    pub force_cni_version: bool,
    /// Take the shim network name from the delegate
    #[serde(rename = "overrideNetworkName", default)]
    pub override_network_name: bool,
    /// Directory the shim configuration is written to
    #[serde(rename = "cniConfigDir", default = "default_cni_config_dir")]
    pub cni_config_dir: PathBuf,
}

fn default_network_name() -> String {
    DEFAULT_NETWORK_NAME.to_string()
}

fn default_autoconfig_dir() -> PathBuf {
    PathBuf::from(DEFAULT_AUTOCONFIG_DIR)
}

fn default_cni_config_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CNI_CONFIG_DIR)
}

impl MultusConfig {
    /// Configuration with defaults for everything but the CNI version
    pub fn new(cni_version: &str) -> Self {
        Self {
            name: default_network_name(),
            cni_version: cni_version.to_string(),
            autoconfig_dir: default_autoconfig_dir(),
            master_cni_file_name: None,
            force_cni_version: false,
            override_network_name: false,
            cni_config_dir: default_cni_config_dir(),
        }
    }

    /// Read the top-level configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| ConfigError::io(path, e))?;
        Self::parse(&bytes).map_err(|e| match e {
            ConfigError::MalformedConfig { reason, .. } => ConfigError::malformed(path, reason),
            other => other,
        })
    }

    /// Parse a top-level configuration document
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let conf: MultusConfig = serde_json::from_slice(bytes)
            .map_err(|e| ConfigError::malformed("<multus config>", e))?;

        if conf.cni_version.trim().is_empty() {
            return Err(ConfigError::malformed(
                "<multus config>",
                "cniVersion must not be empty",
            ));
        }

        if conf.name.is_empty() {
            return Err(ConfigError::malformed(
                "<multus config>",
                "name must not be empty",
            ));
        }

        Ok(conf)
    }

    /// Where the generated shim configuration lives
    pub fn multus_config_file_path(&self) -> PathBuf {
        self.cni_config_dir.join(MULTUS_CONFIG_FILE_NAME)
    }
}
