//! Controller configuration
//!
//! Flags with environment fallbacks are parsed once in `main` into a
//! [`ProvisionerConfig`], which is then handed to every component. Nothing
//! else reads the process environment.

use crate::error::ControllerError;
use crate::nic::{NicMode, NicPolicy};
use clap::Parser;
use maas_client::MaasApiKey;
use std::path::PathBuf;
use std::time::Duration;

/// Well-known LXD control socket locations, in lookup order
pub const DEFAULT_SOCKET_CANDIDATES: &[&str] = &[
    "/var/snap/lxd/common/lxd/unix.socket",
    "/var/lib/lxd/unix.socket",
    "/run/lxd/unix.socket",
];

/// Which phases a process runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Action {
    /// Resolve facts and initialize the hypervisor, then idle
    Init,
    /// Register, validate and signal completion, then idle
    Register,
    /// Full pipeline, then idle
    Both,
    /// Full pipeline, then exit
    Once,
    /// Full pipeline, then idle with periodic trust refresh
    Daemon,
}

impl Action {
    pub fn runs_initialization(self) -> bool {
        !matches!(self, Action::Register)
    }

    pub fn runs_registration(self) -> bool {
        !matches!(self, Action::Init)
    }

    /// Whether the process stays resident after the pipeline
    pub fn keeps_alive(self) -> bool {
        !matches!(self, Action::Once)
    }

    pub fn refreshes_trust(self) -> bool {
        matches!(self, Action::Daemon)
    }
}

/// Command line of `hypervisor-node-controller`
#[derive(Debug, Parser)]
#[command(name = "hypervisor-node-controller", version, about)]
pub struct Cli {
    /// Phases to run
    #[arg(long, env = "ACTION", value_enum, default_value = "daemon")]
    pub action: Action,

    /// Kubernetes node name of this host
    #[arg(long, env = "NODE_NAME")]
    pub node_name: String,

    /// Address the LXD API listens on; defaults to the node's InternalIP
    #[arg(long, env = "NODE_IP")]
    pub node_ip: Option<String>,

    /// MAAS system id; defaults to the last segment of the node's providerID
    #[arg(long, env = "MAAS_SYSTEM_ID")]
    pub system_id: Option<String>,

    #[arg(long, env = "MAAS_URL")]
    pub maas_url: String,

    /// `consumer:token:secret`
    #[arg(long, env = "MAAS_API_KEY", hide_env_values = true)]
    pub maas_api_key: String,

    #[arg(long, env = "STORAGE_DRIVER", default_value = "zfs")]
    pub storage_driver: String,

    /// Storage pool size when MAAS cannot size it
    #[arg(long, env = "STORAGE_SIZE_GIB")]
    pub storage_size_gib: Option<u64>,

    /// Managed LXD bridge network
    #[arg(long, env = "NETWORK_BRIDGE", default_value = "lxdbr0")]
    pub network_bridge: String,

    /// Host bridge VM NICs attach to when present
    #[arg(long, env = "HOST_BRIDGE", default_value = "br0")]
    pub host_bridge: String,

    #[arg(long, env = "NIC_MODE", value_enum)]
    pub nic_mode: Option<NicMode>,

    #[arg(long, env = "NIC_PARENT")]
    pub nic_parent: Option<String>,

    /// Never modify an existing managed network
    #[arg(long, env = "SKIP_NETWORK_UPDATE")]
    pub skip_network_update: bool,

    #[arg(long, env = "MAAS_ZONE")]
    pub zone: Option<String>,

    #[arg(long, env = "MAAS_POOL")]
    pub pool: Option<String>,

    #[arg(long, env = "LXD_PROJECT", default_value = "maas")]
    pub project: String,

    /// Seed the per-node trust secret is derived from
    #[arg(long, env = "TRUST_SEED", hide_env_values = true)]
    pub trust_seed: String,

    #[arg(long, env = "LISTEN_PORT", default_value_t = 8443)]
    pub listen_port: u16,

    /// Delay between initialization and registration
    #[arg(long, env = "REGISTER_STAGGER_SECS", default_value_t = 10)]
    pub register_stagger_secs: u64,

    #[arg(long, env = "REGISTER_ATTEMPTS", default_value_t = 5)]
    pub register_attempts: u32,

    #[arg(long, env = "TRUST_REFRESH_SECS", default_value_t = 900)]
    pub trust_refresh_secs: u64,

    #[arg(long, env = "SOCKET_TIMEOUT_SECS", default_value_t = 120)]
    pub socket_timeout_secs: u64,

    /// Root under which `sys/class/net` and `proc/net/route` are read
    #[arg(long, env = "SYSFS_ROOT", default_value = "/")]
    pub sysfs_root: PathBuf,
}

/// Storage pool settings
#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub driver: String,
    pub size_gib: Option<u64>,
}

/// Network settings
#[derive(Debug, Clone)]
pub struct NetworkSettings {
    pub bridge: String,
    pub host_bridge: String,
    pub explicit_nic: Option<NicPolicy>,
    pub skip_update: bool,
}

/// Control socket wait settings
#[derive(Debug, Clone)]
pub struct SocketSettings {
    pub candidates: Vec<PathBuf>,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

/// Everything a provisioning run needs to know
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    pub action: Action,
    pub node_name: String,
    pub node_ip: Option<String>,
    pub system_id: Option<String>,
    pub maas_url: String,
    pub maas_api_key: String,
    pub storage: StorageSettings,
    pub network: NetworkSettings,
    pub zone: Option<String>,
    pub pool: Option<String>,
    pub project: String,
    pub trust_seed: String,
    pub listen_port: u16,
    pub register_stagger: Duration,
    pub register_attempts: u32,
    pub trust_refresh: Duration,
    pub socket: SocketSettings,
    pub sysfs_root: PathBuf,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl TryFrom<Cli> for ProvisionerConfig {
    type Error = ControllerError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        if cli.node_name.trim().is_empty() {
            return Err(ControllerError::InvalidConfig("NODE_NAME must not be empty".to_string()));
        }
        if cli.trust_seed.is_empty() {
            return Err(ControllerError::InvalidConfig("TRUST_SEED must not be empty".to_string()));
        }
        if cli.listen_port == 0 {
            return Err(ControllerError::InvalidConfig("LISTEN_PORT must not be 0".to_string()));
        }
        if cli.register_attempts == 0 {
            return Err(ControllerError::InvalidConfig(
                "REGISTER_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        if cli.trust_refresh_secs == 0 {
            return Err(ControllerError::InvalidConfig(
                "TRUST_REFRESH_SECS must be at least 1".to_string(),
            ));
        }
        MaasApiKey::parse(&cli.maas_api_key)
            .map_err(|e| ControllerError::InvalidConfig(format!("MAAS_API_KEY: {}", e)))?;

        let explicit_nic = match (cli.nic_mode, non_empty(cli.nic_parent)) {
            (Some(mode), Some(parent)) => Some(NicPolicy::new(mode, parent)),
            _ => None,
        };

        Ok(Self {
            action: cli.action,
            node_name: cli.node_name.trim().to_string(),
            node_ip: non_empty(cli.node_ip),
            system_id: non_empty(cli.system_id),
            maas_url: cli.maas_url,
            maas_api_key: cli.maas_api_key,
            storage: StorageSettings {
                driver: cli.storage_driver,
                size_gib: cli.storage_size_gib.filter(|s| *s > 0),
            },
            network: NetworkSettings {
                bridge: cli.network_bridge,
                host_bridge: cli.host_bridge,
                explicit_nic,
                skip_update: cli.skip_network_update,
            },
            zone: non_empty(cli.zone),
            pool: non_empty(cli.pool),
            project: cli.project,
            trust_seed: cli.trust_seed,
            listen_port: cli.listen_port,
            register_stagger: Duration::from_secs(cli.register_stagger_secs),
            register_attempts: cli.register_attempts,
            trust_refresh: Duration::from_secs(cli.trust_refresh_secs),
            socket: SocketSettings {
                candidates: DEFAULT_SOCKET_CANDIDATES.iter().map(PathBuf::from).collect(),
                timeout: Duration::from_secs(cli.socket_timeout_secs),
                poll_interval: Duration::from_secs(1),
            },
            sysfs_root: cli.sysfs_root,
        })
    }
}
