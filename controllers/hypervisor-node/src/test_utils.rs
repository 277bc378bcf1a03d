//! Test utilities for unit testing the provisioning pipeline
//!
//! Builders for records and configuration, plus in-memory fakes for the node
//! store, host interfaces and LXD connection.

use crate::config::{Action, NetworkSettings, ProvisionerConfig, SocketSettings, StorageSettings};
use crate::error::ControllerError;
use crate::hypervisor::{HypervisorSession, LxdConnector};
use crate::identity::NodeIdentity;
use crate::nic::HostInterfaces;
use crate::pipeline::{Collaborators, Pipeline};
use crate::signal::{NodeRecord, NodeStore};
use lxd_client::{CommandRunner, Invocation, LxdError, MockConfigApplier, MockLxdClient, Network};
use maas_client::{HostRef, Machine, MockMaasClient, NamedRef, VmHost};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Configuration for tests: no stagger, short socket wait, no socket candidates
pub fn test_config() -> ProvisionerConfig {
    ProvisionerConfig {
        action: Action::Once,
        node_name: "node-01".to_string(),
        node_ip: None,
        system_id: None,
        maas_url: "http://maas:5240/MAAS".to_string(),
        maas_api_key: "consumer:token:secret".to_string(),
        storage: StorageSettings {
            driver: "zfs".to_string(),
            size_gib: None,
        },
        network: NetworkSettings {
            bridge: "lxdbr0".to_string(),
            host_bridge: "br0".to_string(),
            explicit_nic: None,
            skip_update: false,
        },
        zone: None,
        pool: None,
        project: "maas".to_string(),
        trust_seed: "seed".to_string(),
        listen_port: 8443,
        register_stagger: Duration::ZERO,
        register_attempts: 3,
        trust_refresh: Duration::from_secs(900),
        socket: SocketSettings {
            candidates: Vec::new(),
            timeout: Duration::from_secs(5),
            poll_interval: Duration::from_secs(1),
        },
        sysfs_root: PathBuf::from("/"),
    }
}

/// Node record; an empty provider id leaves it unset
pub fn node_record(name: &str, provider_id: &str, internal_ip: &str) -> NodeRecord {
    NodeRecord {
        name: name.to_string(),
        provider_id: Some(provider_id.to_string()).filter(|p| !p.is_empty()),
        labels: BTreeMap::new(),
        internal_ip: Some(internal_ip.to_string()),
    }
}

/// MAAS machine with `total_gib` of storage
pub fn machine(
    system_id: &str,
    total_gib: u64,
    zone: Option<&str>,
    pool: Option<&str>,
    boot_interface: Option<&str>,
) -> Machine {
    Machine {
        system_id: system_id.to_string(),
        hostname: system_id.to_string(),
        storage: (total_gib * 1024) as f64,
        zone: zone.map(NamedRef::new),
        pool: pool.map(NamedRef::new),
        boot_interface: boot_interface.map(NamedRef::new),
    }
}

/// LXD VM host record; an empty system id means no linked machine
pub fn vm_host(id: u64, name: &str, system_id: &str) -> VmHost {
    VmHost {
        id,
        name: name.to_string(),
        host_type: "lxd".to_string(),
        host: Some(HostRef {
            system_id: system_id.to_string(),
        })
        .filter(|h| !h.system_id.is_empty()),
        ..Default::default()
    }
}

pub fn identity() -> NodeIdentity {
    NodeIdentity {
        name: "node-01".to_string(),
        ip_address: "10.0.0.5".to_string(),
        system_id: "abc123".to_string(),
    }
}

/// In-memory `NodeStore` holding a single node
#[derive(Clone)]
pub struct MockNodeStore {
    record: Arc<Mutex<NodeRecord>>,
    fail_patch: Arc<Mutex<bool>>,
}

impl MockNodeStore {
    pub fn new(record: NodeRecord) -> Self {
        Self {
            record: Arc::new(Mutex::new(record)),
            fail_patch: Arc::new(Mutex::new(false)),
        }
    }

    pub fn record(&self) -> NodeRecord {
        self.record.lock().unwrap().clone()
    }

    pub fn set_fail_patch(&self, fail: bool) {
        *self.fail_patch.lock().unwrap() = fail;
    }

    pub fn remove_label(&self, key: &str) {
        self.record.lock().unwrap().labels.remove(key);
    }
}

#[async_trait::async_trait]
impl NodeStore for MockNodeStore {
    async fn get_node(&self, _name: &str) -> Result<NodeRecord, ControllerError> {
        Ok(self.record())
    }

    async fn set_label(&self, _name: &str, key: &str, value: &str) -> Result<(), ControllerError> {
        if *self.fail_patch.lock().unwrap() {
            return Err(ControllerError::Kube(kube::Error::Service(Box::new(
                std::io::Error::other("patch rejected"),
            ))));
        }
        self.record
            .lock()
            .unwrap()
            .labels
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Host interfaces described in memory
#[derive(Debug, Clone, Default)]
pub struct FakeInterfaces {
    interfaces: BTreeMap<String, bool>,
    default_route: Option<String>,
}

impl FakeInterfaces {
    pub fn with_interface(mut self, name: &str, is_bridge: bool) -> Self {
        self.interfaces.insert(name.to_string(), is_bridge);
        self
    }

    pub fn with_default_route(mut self, name: &str) -> Self {
        self.default_route = Some(name.to_string());
        self
    }
}

impl HostInterfaces for FakeInterfaces {
    fn exists(&self, name: &str) -> bool {
        self.interfaces.contains_key(name)
    }

    fn is_bridge(&self, name: &str) -> bool {
        self.interfaces.get(name).copied().unwrap_or(false)
    }

    fn default_route_interface(&self) -> Option<String> {
        self.default_route.clone()
    }
}

/// `CommandRunner` answering every command with the same stdout
#[derive(Debug, Clone)]
pub struct StaticRunner {
    stdout: String,
}

impl StaticRunner {
    pub fn new(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl CommandRunner for StaticRunner {
    async fn run(&self, _invocation: &Invocation) -> Result<String, LxdError> {
        Ok(self.stdout.clone())
    }
}

/// Connects every socket to the same mock daemon
#[derive(Debug, Clone)]
pub struct MockConnector {
    pub lxd: MockLxdClient,
    pub applier: MockConfigApplier,
}

impl LxdConnector for MockConnector {
    fn connect(&self, socket: &Path) -> HypervisorSession {
        HypervisorSession {
            socket: socket.to_path_buf(),
            lxd: Arc::new(self.lxd.clone()),
            applier: Arc::new(self.applier.clone()),
        }
    }

    fn diagnostics_runner(&self) -> Arc<dyn CommandRunner> {
        Arc::new(StaticRunner::new(""))
    }
}

/// A freshly installed hypervisor host with all collaborators mocked
///
/// The daemon has only its defaults and one unmanaged `eth0` network; MAAS
/// knows machine `abc123` (100 GiB, zone `z1`, pool `p1`); the node has no
/// completion label.
pub struct TestHost {
    _dir: tempfile::TempDir,
    pub socket: PathBuf,
    pub config: ProvisionerConfig,
    pub lxd: MockLxdClient,
    pub applier: MockConfigApplier,
    pub maas: MockMaasClient,
    pub nodes: MockNodeStore,
    pub connector: MockConnector,
    pub interfaces: FakeInterfaces,
}

impl TestHost {
    pub fn fresh() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("unix.socket");
        std::fs::write(&socket, b"").unwrap();

        let mut config = test_config();
        config.socket.candidates = vec![dir.path().join("missing.socket"), socket.clone()];

        let lxd = MockLxdClient::new();
        lxd.add_network(Network {
            name: "eth0".to_string(),
            network_type: "physical".to_string(),
            managed: false,
            ..Default::default()
        });
        let applier = MockConfigApplier::new(lxd.clone());

        let maas = MockMaasClient::new("http://maas:5240/MAAS");
        maas.add_machine(machine("abc123", 100, Some("z1"), Some("p1"), Some("eth0")));

        Self {
            _dir: dir,
            socket,
            config,
            connector: MockConnector {
                lxd: lxd.clone(),
                applier: applier.clone(),
            },
            lxd,
            applier,
            maas,
            nodes: MockNodeStore::new(node_record("node-01", "maas:///abc123", "10.0.0.5")),
            interfaces: FakeInterfaces::default().with_interface("eth0", false),
        }
    }

    pub fn remove_socket(&self) {
        std::fs::remove_file(&self.socket).unwrap();
    }

    pub fn pipeline(&self) -> Pipeline<'_> {
        Pipeline::new(
            &self.config,
            Collaborators {
                nodes: &self.nodes,
                maas: &self.maas,
                connector: &self.connector,
                interfaces: &self.interfaces,
            },
        )
    }
}

