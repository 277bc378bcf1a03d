//! Fact resolution
//!
//! Correlates the Kubernetes node with its MAAS machine record to learn the
//! node's identity and the facts that size and place the hypervisor: storage
//! size, zone, resource pool and boot interface.

use crate::config::ProvisionerConfig;
use crate::error::ControllerError;
use crate::identity::{NodeIdentity, parse_system_id};
use crate::report::{WarningKind, Warnings};
use crate::signal::NodeRecord;
use maas_client::MaasClientTrait;
use tracing::{debug, info};

/// Pool size used when MAAS cannot size the pool
pub const FALLBACK_STORAGE_GIB: u64 = 50;

/// Share of total storage given to the pool; the rest stays with the host OS
pub const STORAGE_SHARE: f64 = 0.8;

/// Facts learned from the inventory; missing facts stay `None`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeFacts {
    pub storage_gib: Option<u64>,
    pub zone: Option<String>,
    pub pool: Option<String>,
    pub boot_interface: Option<String>,
}

/// Pool size for a machine reporting `total_gib` of storage
pub fn storage_size_gib(total_gib: f64) -> Result<u64, ControllerError> {
    if !total_gib.is_finite() || total_gib <= 0.0 {
        return Err(ControllerError::InsufficientData(format!(
            "machine reports {} GiB of storage",
            total_gib
        )));
    }
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "value is finite, positive and far below u64::MAX"
    )]
    let size = (total_gib * STORAGE_SHARE).round() as u64;
    Ok(size.max(1))
}

/// Resolves identity and placement facts for one node
pub struct FactResolver<'a> {
    maas: &'a dyn MaasClientTrait,
    config: &'a ProvisionerConfig,
}

impl<'a> FactResolver<'a> {
    pub fn new(maas: &'a dyn MaasClientTrait, config: &'a ProvisionerConfig) -> Self {
        Self { maas, config }
    }

    /// Build the node identity from configuration and the Node record
    ///
    /// Configured values take precedence over what the Node reports.
    pub fn resolve_identity(&self, node: &NodeRecord) -> Result<NodeIdentity, ControllerError> {
        let system_id = match &self.config.system_id {
            Some(id) => id.clone(),
            None => {
                let provider_id = node.provider_id.as_deref().ok_or_else(|| {
                    ControllerError::FactResolution(format!("node {} has no providerID", node.name))
                })?;
                parse_system_id(provider_id)?
            }
        };
        let ip_address = self
            .config
            .node_ip
            .clone()
            .or_else(|| node.internal_ip.clone())
            .ok_or_else(|| {
                ControllerError::FactResolution(format!(
                    "node {} has no InternalIP and NODE_IP is not set",
                    node.name
                ))
            })?;

        Ok(NodeIdentity {
            name: self.config.node_name.clone(),
            ip_address,
            system_id,
        })
    }

    /// Look up the machine record
    ///
    /// Fails with `FactResolution` when MAAS cannot be queried. A machine
    /// reporting no storage fails sizing with `InsufficientData`, which is
    /// recorded as a warning; the other facts are still returned.
    pub async fn resolve_facts(
        &self,
        identity: &NodeIdentity,
        warnings: &mut Warnings,
    ) -> Result<NodeFacts, ControllerError> {
        let machine = self.maas.get_machine(&identity.system_id).await.map_err(|e| {
            ControllerError::FactResolution(format!("machine {}: {}", identity.system_id, e))
        })?;
        debug!("Machine {} ({}) found in MAAS", machine.system_id, machine.hostname);

        let storage_gib = match storage_size_gib(machine.total_storage_gib()) {
            Ok(size) => Some(size),
            Err(e) => {
                warnings.push(WarningKind::FactResolution, e.to_string());
                None
            }
        };

        let facts = NodeFacts {
            storage_gib,
            zone: machine.zone_name().map(str::to_string),
            pool: machine.pool_name().map(str::to_string),
            boot_interface: machine.boot_interface_name().map(str::to_string),
        };
        for (name, value) in [
            ("zone", &facts.zone),
            ("resource pool", &facts.pool),
            ("boot interface", &facts.boot_interface),
        ] {
            if value.is_none() {
                info!("MAAS reports no {} for {}", name, identity.system_id);
            }
        }
        Ok(facts)
    }

    /// Resolve facts, falling back to configured values when MAAS is unavailable
    pub async fn resolve_or_default(&self, identity: &NodeIdentity, warnings: &mut Warnings) -> NodeFacts {
        match self.resolve_facts(identity, warnings).await {
            Ok(facts) => facts,
            Err(e) => {
                warnings.push(WarningKind::FactResolution, format!("{}; using configured defaults", e));
                NodeFacts::default()
            }
        }
    }
}

/// Facts merged with configuration: resolved values override flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub storage_gib: u64,
    pub zone: Option<String>,
    pub pool: Option<String>,
    pub boot_interface: Option<String>,
}

impl Placement {
    pub fn merge(facts: &NodeFacts, config: &ProvisionerConfig) -> Self {
        Self {
            storage_gib: facts
                .storage_gib
                .or(config.storage.size_gib)
                .unwrap_or(FALLBACK_STORAGE_GIB),
            zone: facts.zone.clone().or_else(|| config.zone.clone()),
            pool: facts.pool.clone().or_else(|| config.pool.clone()),
            boot_interface: facts.boot_interface.clone(),
        }
    }
}
