use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use tracing::debug;

use crate::config::MultusConfig;
use crate::error::{ConfigError, Result};

/// File extensions recognized as CNI configuration
pub const CNI_CONFIG_EXTENSIONS: [&str; 3] = ["conf", "conflist", "json"];

/// Pick the primary plugin configuration file name inside `dir`.
///
/// An explicit `multusMasterCNI` wins when it exists. Otherwise the
/// lexicographically first CNI configuration file is used, skipping the
/// shim file this crate writes.
pub fn locate(dir: &Path, config: &MultusConfig) -> Result<String> {
    let shim_path = config.multus_config_file_path();

    if let Some(name) = &config.master_cni_file_name {
        let path = dir.join(name);
        if same_file(&path, &shim_path) {
            return Err(ConfigError::RecursiveShimConfig { path });
        }
        if !path.is_file() {
            return Err(ConfigError::PrimaryPluginNotFound { path });
        }
        return Ok(name.clone());
    }

    let name = candidates(dir)?
        .into_iter()
        .find(|path| !same_file(path, &shim_path))
        .and_then(|path| file_name(&path))
        .ok_or_else(|| ConfigError::NoPrimaryPluginFound {
            dir: dir.to_path_buf(),
        })?;

    debug!("Primary CNI plugin in {}: {}", dir.display(), name);
    Ok(name)
}

/// First CNI configuration file in `dir`, without any exclusions
pub fn primary_plugin_name(dir: &Path) -> Result<String> {
    candidates(dir)?
        .first()
        .and_then(|path| file_name(path))
        .ok_or_else(|| ConfigError::NoPrimaryPluginFound {
            dir: dir.to_path_buf(),
        })
}

/// Regular CNI configuration files in `dir`, sorted by file name
fn candidates(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| ConfigError::io(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::io(dir, e))?;
        let path = entry.path();
        if is_cni_config(&path) && path.is_file() {
            files.push(path);
        }
    }

    Ok(files
        .into_iter()
        .sorted_by(|a, b| a.file_name().cmp(&b.file_name()))
        .collect())
}

/// Whether two paths name the same file, however each was spelled
pub fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (resolve(a), resolve(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

// A file that does not exist yet (the shim before its first write) is
// resolved through its parent directory
fn resolve(path: &Path) -> Option<PathBuf> {
    if let Ok(resolved) = fs::canonicalize(path) {
        return Some(resolved);
    }
    let absolute = std::path::absolute(path).ok()?;
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = fs::canonicalize(parent).unwrap_or_else(|_| parent.to_path_buf());
            Some(parent.join(name))
        }
        _ => Some(absolute),
    }
}

pub fn is_cni_config(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map_or(false, |ext| CNI_CONFIG_EXTENSIONS.contains(&ext))
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(OsStr::to_str)
        .map(str::to_string)
}
