//! LXD API models
//!
//! These models match the LXD REST API (`/1.0`) objects the provisioner reads
//! and writes. Configuration maps are string to string as LXD stores them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Device map of a profile or instance: device name to device config
pub type Devices = BTreeMap<String, BTreeMap<String, String>>;

/// `GET /1.0`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub auth: String,
    /// Server config; secret keys such as `core.trust_password` are reported
    /// as a boolean presence flag rather than their value
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub environment: ServerEnvironment,
}

impl ServerInfo {
    /// Whether the daemon reports a trust password as set
    pub fn trust_password_set(&self) -> bool {
        match self.config.get("core.trust_password") {
            Some(serde_json::Value::Bool(set)) => *set,
            Some(serde_json::Value::String(s)) => !s.is_empty(),
            _ => false,
        }
    }

    pub fn https_address(&self) -> Option<&str> {
        self.config.get("core.https_address").and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerEnvironment {
    #[serde(default)]
    pub server_name: String,
    #[serde(default)]
    pub server_version: String,
}

/// Storage pool as returned by `GET /1.0/storage-pools/{name}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoragePool {
    pub name: String,
    #[serde(default)]
    pub driver: String,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
    #[serde(default)]
    pub status: String,
}

impl StoragePool {
    pub fn size(&self) -> Option<&str> {
        self.config.get("size").map(String::as_str)
    }
}

/// `POST /1.0/storage-pools`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoragePoolsPost {
    pub name: String,
    pub driver: String,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

/// Network as returned by `GET /1.0/networks/{name}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    #[serde(default, rename = "type")]
    pub network_type: String,
    #[serde(default)]
    pub managed: bool,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

impl Network {
    pub fn is_bridge(&self) -> bool {
        self.network_type == "bridge"
    }
}

/// `POST /1.0/networks`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworksPost {
    pub name: String,
    #[serde(rename = "type")]
    pub network_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

/// `POST /1.0/profiles`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilesPost {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
    #[serde(default)]
    pub devices: Devices,
}

/// `POST /1.0/projects`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectsPost {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

/// Partial config update sent with `PATCH`; keys not present are kept
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPatch {
    pub config: BTreeMap<String, String>,
}

impl ConfigPatch {
    pub fn single(key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut config = BTreeMap::new();
        config.insert(key.into(), value.into());
        Self { config }
    }
}

/// Extract the trailing object name from an LXD URL such as
/// `/1.0/profiles/default?project=maas`
pub fn name_from_url(url: &str) -> &str {
    let path = url.split('?').next().unwrap_or(url);
    path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
}
