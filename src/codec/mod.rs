//! Reading and writing CNI configuration files.
//!
//! Every write goes through [`write_atomic`]: readers of a file written here
//! see either the old or the new content, never a partial one.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::types::{NetConfDocument, CNI_VERSION_KEY, NAME_KEY, PLUGINS_KEY, TYPE_KEY};

/// Read and validate a delegate configuration file
pub fn parse(path: impl AsRef<Path>) -> Result<NetConfDocument> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| ConfigError::io(path, e))?;
    parse_bytes(path, &bytes)
}

/// Validate a delegate configuration already in memory; `path` is only used for errors
pub fn parse_bytes(path: &Path, bytes: &[u8]) -> Result<NetConfDocument> {
    let fields: Map<String, Value> =
        serde_json::from_slice(bytes).map_err(|e| ConfigError::malformed(path, e))?;

    require_string(path, &fields, CNI_VERSION_KEY)?;
    require_string(path, &fields, NAME_KEY)?;

    // A plugin list names its plugins instead of a single type
    match fields.get(PLUGINS_KEY) {
        Some(Value::Array(_)) => {}
        Some(_) => return Err(ConfigError::malformed(path, "'plugins' must be a list")),
        None => require_string(path, &fields, TYPE_KEY)?,
    }

    Ok(NetConfDocument::from_map(fields))
}

fn require_string(path: &Path, fields: &Map<String, Value>, key: &str) -> Result<()> {
    match fields.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(()),
        Some(_) => Err(ConfigError::malformed(
            path,
            format!("'{}' must be a non-empty string", key),
        )),
        None => Err(ConfigError::malformed(
            path,
            format!("missing required key '{}'", key),
        )),
    }
}

/// Rewrite the `cniVersion` of a configuration file, leaving every other key untouched
pub fn override_cni_version(path: impl AsRef<Path>, version: &str) -> Result<()> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| ConfigError::io(path, e))?;
    let mut fields: Map<String, Value> =
        serde_json::from_slice(&bytes).map_err(|e| ConfigError::malformed(path, e))?;

    fields.insert(CNI_VERSION_KEY.to_string(), Value::String(version.to_string()));

    let mut encoded =
        serde_json::to_vec_pretty(&fields).map_err(|e| ConfigError::malformed(path, e))?;
    encoded.push(b'\n');

    let permissions = fs::metadata(path)
        .map_err(|e| ConfigError::io(path, e))?
        .permissions();
    write_atomic_with_permissions(path, &encoded, Some(permissions))
}

/// Replace `path` with `contents` via a temporary file in the same directory
pub fn write_atomic(path: impl AsRef<Path>, contents: &[u8]) -> Result<()> {
    write_atomic_with_permissions(path.as_ref(), contents, None)
}

fn write_atomic_with_permissions(
    path: &Path,
    contents: &[u8],
    permissions: Option<fs::Permissions>,
) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| ConfigError::io(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| ConfigError::io(dir, e))?;
    tmp.write_all(contents)
        .map_err(|e| ConfigError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| ConfigError::io(tmp.path(), e))?;

    if let Some(permissions) = permissions {
        fs::set_permissions(tmp.path(), permissions)
            .map_err(|e| ConfigError::io(tmp.path(), e))?;
    }

    debug!("Replacing {} atomically", path.display());
    tmp.persist(path)
        .map_err(|e| ConfigError::io(path, e.error))?;

    Ok(())
}
