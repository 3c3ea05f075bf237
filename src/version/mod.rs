use std::path::Path;

use tracing::warn;

use crate::codec;
use crate::error::{ConfigError, Result};
use crate::types::NetConfDocument;

/// Result of comparing a delegate's CNI version with the top-level one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Versions agree
    Accepted,
    /// Versions differ and the delegate must be rewritten to the top-level version
    Override,
}

/// Decide whether a delegate version is acceptable
pub fn check(delegate_version: &str, top_level_version: &str, force: bool) -> Result<Outcome> {
    if normalize(delegate_version) == normalize(top_level_version) {
        return Ok(Outcome::Accepted);
    }

    if force {
        return Ok(Outcome::Override);
    }

    Err(ConfigError::VersionMismatch {
        delegate: delegate_version.to_string(),
        top_level: top_level_version.to_string(),
    })
}

/// Apply [`check`] to a parsed delegate, rewriting the file on disk when forced.
///
/// Returns the document the caller should continue with.
pub fn reconcile(
    path: &Path,
    document: NetConfDocument,
    top_level_version: &str,
    force: bool,
) -> Result<NetConfDocument> {
    let delegate_version = document
        .cni_version()
        .ok_or_else(|| ConfigError::malformed(path, "missing required key 'cniVersion'"))?;

    match check(delegate_version, top_level_version, force)? {
        Outcome::Accepted => Ok(document),
        Outcome::Override => {
            warn!(
                "Overriding cniVersion of {} from {} to {}",
                path.display(),
                delegate_version,
                top_level_version
            );
            codec::override_cni_version(path, top_level_version)?;
            codec::parse(path)
        }
    }
}

/// Canonical form of a dotted version: `v0.4` and `0.4.0` compare equal
fn normalize(version: &str) -> String {
    let trimmed = version.trim();
    let bare = trimmed.strip_prefix('v').unwrap_or(trimmed);

    let parts: Option<Vec<u64>> = bare.split('.').map(|p| p.parse().ok()).collect();
    match parts {
        Some(mut parts) if !parts.is_empty() && parts.len() <= 3 => {
            parts.resize(3, 0);
            parts.iter().map(u64::to_string).collect::<Vec<_>>().join(".")
        }
        _ => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_versions_are_accepted() {
        assert_eq!(check("0.4.0", "0.4.0", false).unwrap(), Outcome::Accepted);
        assert_eq!(check(" 0.4.0", "0.4.0 ", false).unwrap(), Outcome::Accepted);
        assert_eq!(check("0.4", "0.4.0", false).unwrap(), Outcome::Accepted);
        assert_eq!(check("v1.0.0", "1.0.0", false).unwrap(), Outcome::Accepted);
    }

    #[test]
    fn test_mismatch_names_both_versions() {
        let err = check("0.3.1", "0.4.0", false).unwrap_err();
        assert_eq!(
            err.to_string(),
            "delegate cni version is 0.3.1 while top level cni version is 0.4.0"
        );
    }

    #[test]
    fn test_mismatch_with_force_overrides() {
        assert_eq!(check("0.3.1", "0.4.0", true).unwrap(), Outcome::Override);
    }

    #[test]
    fn test_non_numeric_versions_compare_verbatim() {
        assert!(check("latest", "latest", false).is_ok());
        assert!(check("1.0.0-rc1", "1.0.0", false).is_err());
    }
}
