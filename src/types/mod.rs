use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Plugin type of the generated shim configuration
pub const SHIM_PLUGIN_TYPE: &str = "multus-shim";

pub const CNI_VERSION_KEY: &str = "cniVersion";
pub const NAME_KEY: &str = "name";
pub const TYPE_KEY: &str = "type";
pub const PLUGINS_KEY: &str = "plugins";
pub const CAPABILITIES_KEY: &str = "capabilities";

/// A delegate CNI configuration document.
///
/// Keys keep their on-disk order so that a rewrite of `cniVersion` leaves the
/// rest of the administrator's file as it was.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetConfDocument {
    fields: Map<String, Value>,
}

impl NetConfDocument {
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// CNI specification version declared by the delegate
    pub fn cni_version(&self) -> Option<&str> {
        self.str_field(CNI_VERSION_KEY)
    }

    /// Network name of the delegate
    pub fn name(&self) -> Option<&str> {
        self.str_field(NAME_KEY)
    }

    /// Plugin type; `None` for plugin lists
    pub fn plugin_type(&self) -> Option<&str> {
        self.str_field(TYPE_KEY)
    }

    /// Plugins of a `.conflist` document
    pub fn plugins(&self) -> Option<&Vec<Value>> {
        self.fields.get(PLUGINS_KEY).and_then(Value::as_array)
    }

    pub fn is_plugin_list(&self) -> bool {
        self.plugins().is_some()
    }

    /// Capabilities enabled by the delegate.
    ///
    /// For a plugin list this is the union over all of its plugins. Only
    /// capabilities set to `true` are reported.
    pub fn capabilities(&self) -> BTreeMap<String, bool> {
        let mut enabled = BTreeMap::new();
        let mut collect = |value: Option<&Value>| {
            if let Some(caps) = value.and_then(Value::as_object) {
                for (key, value) in caps {
                    if value.as_bool() == Some(true) {
                        enabled.insert(key.clone(), true);
                    }
                }
            }
        };

        collect(self.fields.get(CAPABILITIES_KEY));
        if let Some(plugins) = self.plugins() {
            for plugin in plugins {
                collect(plugin.get(CAPABILITIES_KEY));
            }
        }
        enabled
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Replace the declared CNI version in place
    pub fn set_cni_version(&mut self, version: &str) {
        // Map::insert keeps the position of an existing key with preserve_order
        self.fields
            .insert(CNI_VERSION_KEY.to_string(), Value::String(version.to_string()));
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

/// The shim configuration handed to the container runtime.
///
/// Field order is part of the output contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShimConfig {
    pub cni_version: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub capabilities: BTreeMap<String, bool>,
    pub cluster_network: String,
    #[serde(rename = "type")]
    pub plugin_type: String,
}

impl ShimConfig {
    pub fn new(cni_version: &str, name: &str, cluster_network: &str) -> Self {
        Self {
            cni_version: cni_version.to_string(),
            name: name.to_string(),
            capabilities: BTreeMap::new(),
            cluster_network: cluster_network.to_string(),
            plugin_type: SHIM_PLUGIN_TYPE.to_string(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: BTreeMap<String, bool>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Compact JSON as written to disk
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(value: Value) -> NetConfDocument {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_shim_without_capabilities() {
        let shim = ShimConfig::new("0.4.0", "multus-cni-network", "/etc/cni/net.d/00-mycni.conf");
        assert_eq!(
            shim.to_json().unwrap(),
            r#"{"cniVersion":"0.4.0","name":"multus-cni-network","clusterNetwork":"/etc/cni/net.d/00-mycni.conf","type":"multus-shim"}"#
        );
    }

    #[test]
    fn test_conflist_capabilities_are_merged() {
        let doc = document(json!({
            "cniVersion": "1.0.0",
            "name": "k8s-pod-network",
            "plugins": [
                {"type": "calico", "capabilities": {"bandwidth": true}},
                {"type": "portmap", "capabilities": {"portMappings": true, "snat": false}}
            ]
        }));

        let caps = doc.capabilities();
        assert_eq!(caps.len(), 2);
        assert!(caps.contains_key("bandwidth"));
        assert!(caps.contains_key("portMappings"));
        assert!(doc.plugin_type().is_none());
        assert!(doc.is_plugin_list());
    }

    #[test]
    fn test_set_cni_version_keeps_key_order() {
        let mut doc = document(json!({
            "name": "mycni-name",
            "cniVersion": "0.3.1",
            "type": "mycni"
        }));
        doc.set_cni_version("0.4.0");

        let keys: Vec<_> = doc.fields().keys().cloned().collect();
        assert_eq!(keys, vec!["name", "cniVersion", "type"]);
        assert_eq!(doc.cni_version(), Some("0.4.0"));
    }
}
