//! EnsureNetwork
//!
//! Only relevant in bridged mode. The managed bridge is created once; on later
//! runs the only change ever made to it is enabling IPv4 NAT.

use crate::error::ControllerError;
use crate::nic::{HostInterfaces, NicMode, NicPolicy};
use crate::report::{WarningKind, Warnings};
use lxd_client::{ConfigPatch, LxdClientTrait, LxdError, NetworksPost};
use std::collections::BTreeMap;
use tracing::{debug, info};

const NAT_KEY: &str = "ipv4.nat";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkOutcome {
    Created,
    NatEnabled,
    Unchanged,
    /// Not applied, with the reason
    Skipped(String),
}

/// Desired managed network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSpec {
    pub name: String,
    pub skip_update: bool,
}

impl NetworkSpec {
    fn to_post(&self) -> NetworksPost {
        let config = BTreeMap::from([
            ("ipv4.address".to_string(), "auto".to_string()),
            (NAT_KEY.to_string(), "true".to_string()),
            ("ipv6.address".to_string(), "none".to_string()),
        ]);
        NetworksPost {
            name: self.name.clone(),
            network_type: "bridge".to_string(),
            description: "Managed bridge for MAAS KVM guests".to_string(),
            config,
        }
    }
}

/// Converge the managed network
pub async fn ensure_network(
    lxd: &dyn LxdClientTrait,
    spec: &NetworkSpec,
    nic: &NicPolicy,
    interfaces: &dyn HostInterfaces,
    warnings: &mut Warnings,
) -> Result<NetworkOutcome, ControllerError> {
    if nic.mode != NicMode::Bridged {
        return Ok(NetworkOutcome::Skipped(format!("NIC policy is {}", nic)));
    }
    if spec.name == nic.parent {
        info!("Network {} is the NIC parent, not managing it", spec.name);
        return Ok(NetworkOutcome::Skipped(format!("{} is the NIC parent", spec.name)));
    }

    let network = match lxd.get_network(&spec.name).await {
        Ok(network) => network,
        Err(LxdError::NotFound(_)) => {
            if interfaces.exists(&spec.name) {
                info!("Host interface {} exists outside LXD, not managing it", spec.name);
                return Ok(NetworkOutcome::Skipped(format!(
                    "host interface {} exists",
                    spec.name
                )));
            }
            info!("Creating bridge network {}", spec.name);
            lxd.create_network(&spec.to_post()).await?;
            return Ok(NetworkOutcome::Created);
        }
        Err(e) => return Err(e.into()),
    };

    if !network.managed {
        info!("Network {} is an unmanaged host interface, not managing it", spec.name);
        return Ok(NetworkOutcome::Skipped(format!(
            "host interface {} exists",
            spec.name
        )));
    }
    if !network.is_bridge() {
        info!(
            "Network {} is of type {}, leaving it untouched",
            spec.name, network.network_type
        );
        return Ok(NetworkOutcome::Unchanged);
    }
    if network.config.get(NAT_KEY).map(String::as_str) == Some("true") {
        debug!("Network {} already has NAT enabled", spec.name);
        return Ok(NetworkOutcome::Unchanged);
    }
    if spec.skip_update {
        info!("Network {} has NAT disabled; updates are skipped", spec.name);
        return Ok(NetworkOutcome::Unchanged);
    }

    match lxd
        .update_network(&spec.name, &ConfigPatch::single(NAT_KEY, "true"))
        .await
    {
        Ok(()) => {
            info!("Enabled NAT on network {}", spec.name);
            Ok(NetworkOutcome::NatEnabled)
        }
        Err(e) => {
            warnings.push(
                WarningKind::Configuration,
                format!("failed to enable NAT on network {}: {}", spec.name, e),
            );
            Ok(NetworkOutcome::Unchanged)
        }
    }
}
