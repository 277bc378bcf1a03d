//! MAAS API models
//!
//! These models cover the subset of the MAAS 2.0 machine and pod (VM host)
//! handlers used for hypervisor registration. Unknown fields are ignored so the
//! client keeps working across MAAS releases.

use serde::{Deserialize, Serialize};

/// Reference to a named MAAS object (zone, resource pool, interface)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef {
    #[serde(default)]
    pub id: Option<u64>,
    pub name: String,
}

impl NamedRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }
}

/// Reference to the machine backing a VM host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRef {
    #[serde(default)]
    pub system_id: String,
}

/// Machine model matching the MAAS machine handler output
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Machine {
    pub system_id: String,
    #[serde(default)]
    pub hostname: String,
    /// Total storage in megabytes as reported by MAAS
    #[serde(default)]
    pub storage: f64,
    #[serde(default)]
    pub zone: Option<NamedRef>,
    #[serde(default)]
    pub pool: Option<NamedRef>,
    #[serde(default)]
    pub boot_interface: Option<NamedRef>,
}

impl Machine {
    /// Total storage converted to GiB
    pub fn total_storage_gib(&self) -> f64 {
        self.storage / 1024.0
    }

    pub fn zone_name(&self) -> Option<&str> {
        self.zone.as_ref().map(|z| z.name.as_str()).filter(|n| !n.is_empty())
    }

    pub fn pool_name(&self) -> Option<&str> {
        self.pool.as_ref().map(|p| p.name.as_str()).filter(|n| !n.is_empty())
    }

    pub fn boot_interface_name(&self) -> Option<&str> {
        self.boot_interface
            .as_ref()
            .map(|i| i.name.as_str())
            .filter(|n| !n.is_empty())
    }
}

/// VM host (pod) model matching the MAAS pod handler output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmHost {
    pub id: u64,
    pub name: String,
    #[serde(default, rename = "type")]
    pub host_type: String,
    #[serde(default)]
    pub host: Option<HostRef>,
    #[serde(default)]
    pub power_address: Option<String>,
    #[serde(default)]
    pub zone: Option<NamedRef>,
    #[serde(default)]
    pub pool: Option<NamedRef>,
    #[serde(default)]
    pub project: Option<String>,
}

impl VmHost {
    /// System ID of the machine backing this VM host, empty when MAAS has not
    /// linked one yet
    pub fn system_id(&self) -> &str {
        self.host.as_ref().map_or("", |h| h.system_id.as_str())
    }

    pub fn zone_name(&self) -> Option<&str> {
        self.zone.as_ref().map(|z| z.name.as_str())
    }

    pub fn pool_name(&self) -> Option<&str> {
        self.pool.as_ref().map(|p| p.name.as_str())
    }
}

/// Request body for registering an LXD VM host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VmHostCreateRequest {
    pub name: String,
    pub power_address: String,
    pub password: Option<String>,
    pub zone: Option<String>,
    pub pool: Option<String>,
    pub project: Option<String>,
}

impl VmHostCreateRequest {
    /// Form fields as sent to `POST /api/2.0/pods/`
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("type", "lxd".to_string()),
            ("name", self.name.clone()),
            ("power_address", self.power_address.clone()),
        ];
        if let Some(password) = &self.password {
            fields.push(("password", password.clone()));
        }
        if let Some(zone) = &self.zone {
            fields.push(("zone", zone.clone()));
        }
        if let Some(pool) = &self.pool {
            fields.push(("pool", pool.clone()));
        }
        if let Some(project) = &self.project {
            fields.push(("project", project.clone()));
        }
        fields
    }
}

/// Partial update for an existing VM host; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VmHostUpdateRequest {
    pub zone: Option<String>,
    pub pool: Option<String>,
    pub project: Option<String>,
}

impl VmHostUpdateRequest {
    pub fn is_empty(&self) -> bool {
        self.zone.is_none() && self.pool.is_none() && self.project.is_none()
    }

    /// Form fields as sent to `PUT /api/2.0/pods/{id}/`
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = Vec::new();
        if let Some(zone) = &self.zone {
            fields.push(("zone", zone.clone()));
        }
        if let Some(pool) = &self.pool {
            fields.push(("pool", pool.clone()));
        }
        if let Some(project) = &self.project {
            fields.push(("project", project.clone()));
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_deserializes_from_maas_json() {
        let json = serde_json::json!({
            "system_id": "abc123",
            "hostname": "node-01",
            "storage": 102400.0,
            "zone": {"id": 1, "name": "z1", "description": ""},
            "pool": {"id": 2, "name": "p1", "description": ""},
            "boot_interface": {"id": 7, "name": "eth0", "type": "physical"},
            "status_name": "Deployed"
        });
        let machine: Machine = serde_json::from_value(json).unwrap();
        assert_eq!(machine.system_id, "abc123");
        assert_eq!(machine.total_storage_gib(), 100.0);
        assert_eq!(machine.zone_name(), Some("z1"));
        assert_eq!(machine.pool_name(), Some("p1"));
        assert_eq!(machine.boot_interface_name(), Some("eth0"));
    }

    #[test]
    fn test_machine_missing_facts_are_none() {
        let json = serde_json::json!({"system_id": "abc123", "zone": {"name": ""}});
        let machine: Machine = serde_json::from_value(json).unwrap();
        assert_eq!(machine.storage, 0.0);
        assert_eq!(machine.zone_name(), None);
        assert_eq!(machine.boot_interface_name(), None);
    }

    #[test]
    fn test_vm_host_without_backing_machine() {
        let json = serde_json::json!({"id": 4, "name": "node-01", "type": "lxd", "host": null});
        let host: VmHost = serde_json::from_value(json).unwrap();
        assert_eq!(host.system_id(), "");
        assert_eq!(host.host_type, "lxd");
    }

    #[test]
    fn test_create_request_omits_unset_fields() {
        let request = VmHostCreateRequest {
            name: "node-01".to_string(),
            power_address: "10.0.0.5:8443".to_string(),
            zone: Some("z1".to_string()),
            ..Default::default()
        };
        let fields = request.form_fields();
        assert!(fields.contains(&("type", "lxd".to_string())));
        assert!(fields.contains(&("zone", "z1".to_string())));
        assert!(!fields.iter().any(|(k, _)| *k == "pool" || *k == "password"));
    }
}
