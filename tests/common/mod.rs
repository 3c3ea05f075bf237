#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde_json::json;
use tempfile::TempDir;

use multus_config::MultusConfig;

pub const PRIMARY_CNI_PLUGIN_NAME: &str = "00-mycni.conf";

pub const PRIMARY_CNI_PLUGIN_TEMPLATE: &str = r#"
{
  "cniVersion": "0.4.0",
  "name": "mycni-name",
  "type": "mycni",
  "ipam": {},
  "dns": {}
}
"#;

pub const TOP_LEVEL_CNI_VERSION: &str = "0.4.0";

/// An autoconfig directory holding a primary plugin and a top-level config
pub struct Fixture {
    pub autoconfig_dir: TempDir,
    pub shim_dir: TempDir,
    pub primary: PathBuf,
}

impl Fixture {
    pub fn new(primary_template: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let autoconfig_dir = tempfile::Builder::new().prefix("multus-config").tempdir()?;
        let shim_dir = tempfile::Builder::new().prefix("multus-shim").tempdir()?;

        let primary = autoconfig_dir.path().join(PRIMARY_CNI_PLUGIN_NAME);
        fs::write(&primary, primary_template)?;

        Ok(Self {
            autoconfig_dir,
            shim_dir,
            primary,
        })
    }

    /// Write the top-level multus config next to the primary plugin and load it
    pub fn multus_config(
        &self,
        master: Option<&str>,
        force_cni_version: bool,
    ) -> Result<MultusConfig, Box<dyn std::error::Error>> {
        // The name is set explicitly rather than to the primary plugin's path,
        // so shims compare against the default network name
        let mut conf = json!({
            "name": "multus-cni-network",
            "cniVersion": TOP_LEVEL_CNI_VERSION,
            "multusAutoconfigDir": self.autoconfig_dir.path(),
            "forceCNIVersion": force_cni_version,
            "cniConfigDir": self.shim_dir.path(),
        });
        if let Some(master) = master {
            conf["multusMasterCNI"] = json!(master);
        }

        let path = self.autoconfig_dir.path().join("10-testcni.conf");
        fs::write(&path, serde_json::to_vec_pretty(&conf)?)?;
        Ok(MultusConfig::load(&path)?)
    }

    pub fn expected_shim(&self, name: &str) -> String {
        format!(
            "{{\"cniVersion\":\"0.4.0\",\"name\":\"{}\",\"clusterNetwork\":\"{}\",\"type\":\"multus-shim\"}}",
            name,
            self.primary.display()
        )
    }
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn eventually<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    condition()
}
