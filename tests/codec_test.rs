mod common;

use std::fs;
use std::os::unix::fs::PermissionsExt;

use serde_json::{Map, Value};

use common::{Fixture, PRIMARY_CNI_PLUGIN_TEMPLATE};
use multus_config::codec;
use multus_config::ConfigError;

#[test]
fn test_override_cni_version() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = Fixture::new(PRIMARY_CNI_PLUGIN_TEMPLATE)?;
    let before: Map<String, Value> = serde_json::from_slice(&fs::read(&fixture.primary)?)?;

    codec::override_cni_version(&fixture.primary, "1.1.1")?;

    let after: Map<String, Value> = serde_json::from_slice(&fs::read(&fixture.primary)?)?;
    assert_eq!(after["cniVersion"], "1.1.1");
    for (key, value) in &before {
        if key != "cniVersion" {
            assert_eq!(after.get(key), Some(value), "field {} changed", key);
        }
    }
    assert_eq!(before.len(), after.len());

    let reparsed = codec::parse(&fixture.primary)?;
    assert_eq!(reparsed.cni_version(), Some("1.1.1"));
    assert_eq!(reparsed.name(), Some("mycni-name"));

    Ok(())
}

#[test]
fn test_override_preserves_extension_keys_and_mode() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = Fixture::new(
        r#"{"name": "n", "cniVersion": "0.3.1", "type": "bridge", "x-vendor": {"a": [1, 2]}}"#,
    )?;
    fs::set_permissions(&fixture.primary, fs::Permissions::from_mode(0o644))?;

    codec::override_cni_version(&fixture.primary, "0.4.0")?;

    let after: Map<String, Value> = serde_json::from_slice(&fs::read(&fixture.primary)?)?;
    let keys: Vec<_> = after.keys().cloned().collect();
    assert_eq!(keys, vec!["name", "cniVersion", "type", "x-vendor"]);
    assert_eq!(after["x-vendor"]["a"][1], 2);

    let mode = fs::metadata(&fixture.primary)?.permissions().mode() & 0o777;
    assert_eq!(mode, 0o644);

    Ok(())
}

#[test]
fn test_parse_rejects_missing_type() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = Fixture::new(r#"{"cniVersion": "0.4.0", "name": "mycni-name"}"#)?;

    let err = codec::parse(&fixture.primary).unwrap_err();
    assert!(matches!(err, ConfigError::MalformedConfig { .. }));
    assert!(err.to_string().contains("'type'"));

    Ok(())
}

#[test]
fn test_parse_rejects_invalid_json() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = Fixture::new("{\"cniVersion\": ")?;

    let err = codec::parse(&fixture.primary).unwrap_err();
    assert!(matches!(err, ConfigError::MalformedConfig { .. }));

    Ok(())
}

#[test]
fn test_parse_missing_file() {
    let err = codec::parse("/nonexistent/00-mycni.conf").unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.is_not_found());
}

#[test]
fn test_write_atomic_replaces_content() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = Fixture::new(PRIMARY_CNI_PLUGIN_TEMPLATE)?;
    let target = fixture.shim_dir.path().join("nested").join("00-multus.conf");

    codec::write_atomic(&target, b"{\"a\":1}")?;
    codec::write_atomic(&target, b"{\"a\":2}")?;

    assert_eq!(fs::read_to_string(&target)?, "{\"a\":2}");
    // No temporary files are left behind
    let entries = fs::read_dir(target.parent().unwrap())?.count();
    assert_eq!(entries, 1);

    Ok(())
}
