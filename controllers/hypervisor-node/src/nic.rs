//! NIC policy for the VM profile
//!
//! Decides how VM network interfaces attach to the host: bridged onto an
//! existing host bridge, or macvlan on the uplink. The decision is recomputed
//! on every run from configuration and live interface state.

use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Interface used when nothing better can be determined
pub const FALLBACK_INTERFACE: &str = "eth0";

/// How VM NICs attach to the host network
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum NicMode {
    Bridged,
    Macvlan,
}

impl NicMode {
    /// LXD `nictype` value
    pub fn as_str(self) -> &'static str {
        match self {
            NicMode::Bridged => "bridged",
            NicMode::Macvlan => "macvlan",
        }
    }
}

impl fmt::Display for NicMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved NIC attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NicPolicy {
    pub mode: NicMode,
    pub parent: String,
}

impl NicPolicy {
    pub fn new(mode: NicMode, parent: impl Into<String>) -> Self {
        Self {
            mode,
            parent: parent.into(),
        }
    }
}

impl fmt::Display for NicPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.mode, self.parent)
    }
}

/// Read-only view of the host's network interfaces
pub trait HostInterfaces: Send + Sync {
    fn exists(&self, name: &str) -> bool;

    /// Whether the interface is a kernel bridge device
    fn is_bridge(&self, name: &str) -> bool;

    /// Interface carrying the default IPv4 route, lowest metric first
    fn default_route_interface(&self) -> Option<String>;
}

/// `HostInterfaces` backed by sysfs and procfs under `root`
///
/// In a DaemonSet pod `root` is typically the host root filesystem mounted at
/// some path; outside a container it is `/`.
#[derive(Debug, Clone)]
pub struct SysfsInterfaces {
    root: PathBuf,
}

impl SysfsInterfaces {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn interface_dir(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            return None;
        }
        Some(self.root.join("sys/class/net").join(name))
    }
}

impl HostInterfaces for SysfsInterfaces {
    fn exists(&self, name: &str) -> bool {
        self.interface_dir(name).is_some_and(|dir| dir.exists())
    }

    fn is_bridge(&self, name: &str) -> bool {
        self.interface_dir(name)
            .is_some_and(|dir| dir.join("bridge").is_dir())
    }

    fn default_route_interface(&self) -> Option<String> {
        let table = std::fs::read_to_string(self.root.join(Path::new("proc/net/route"))).ok()?;
        parse_default_route(&table)
    }
}

/// Find the default route's interface in `/proc/net/route` content
///
/// Columns: Iface, Destination, Gateway, Flags, RefCnt, Use, Metric, ...
pub fn parse_default_route(table: &str) -> Option<String> {
    table
        .lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 7 || cols[1] != "00000000" {
                return None;
            }
            let metric: u32 = cols[6].parse().ok()?;
            Some((metric, cols[0]))
        })
        .min_by_key(|(metric, _)| *metric)
        .map(|(_, iface)| iface.to_string())
}

/// Decide the NIC policy
///
/// Explicit configuration wins. Otherwise a host bridge that exists and is a
/// genuine bridge selects bridged mode. Otherwise macvlan on the default
/// route's interface, then on the inventory's boot interface, then on
/// [`FALLBACK_INTERFACE`].
pub fn decide_nic_policy(
    explicit: Option<&NicPolicy>,
    host_bridge: &str,
    boot_interface: Option<&str>,
    interfaces: &dyn HostInterfaces,
) -> NicPolicy {
    if let Some(policy) = explicit {
        info!("Using configured NIC policy: {}", policy);
        return policy.clone();
    }

    if interfaces.exists(host_bridge) {
        if interfaces.is_bridge(host_bridge) {
            let policy = NicPolicy::new(NicMode::Bridged, host_bridge);
            info!("Host bridge {} found, NIC policy: {}", host_bridge, policy);
            return policy;
        }
        debug!("{} exists but is not a bridge device", host_bridge);
    }

    let parent = interfaces
        .default_route_interface()
        .or_else(|| boot_interface.filter(|i| !i.is_empty()).map(str::to_string))
        .unwrap_or_else(|| FALLBACK_INTERFACE.to_string());
    let policy = NicPolicy::new(NicMode::Macvlan, parent);
    info!("No usable host bridge, NIC policy: {}", policy);
    policy
}
