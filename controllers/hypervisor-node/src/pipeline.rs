//! The node provisioning pipeline
//!
//! `facts -> initialize -> stagger -> register -> validate -> signal`, run
//! sequentially. The whole pipeline is safe to re-run: every step reads live
//! state first, and a node already carrying the completion label skips it
//! entirely without touching LXD or MAAS.

use crate::config::ProvisionerConfig;
use crate::error::ControllerError;
use crate::facts::{FactResolver, Placement};
use crate::hypervisor::{DesiredState, HypervisorInitializer, LxdConnector};
use crate::hypervisor::listener::listen_address;
use crate::identity::NodeIdentity;
use crate::nic::{HostInterfaces, decide_nic_policy};
use crate::readiness::ReadinessValidator;
use crate::registrar::{HostRegistrar, Registration, normalize_name};
use crate::report::{PipelineReport, WarningKind, Warnings};
use crate::signal::{CompletionPublisher, NodeStore};
use crate::trust::derive_trust_secret;
use maas_client::MaasClientTrait;
use tracing::{Instrument, info, info_span};

/// External systems the pipeline talks to
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub nodes: &'a dyn NodeStore,
    pub maas: &'a dyn MaasClientTrait,
    pub connector: &'a dyn LxdConnector,
    pub interfaces: &'a dyn HostInterfaces,
}

pub struct Pipeline<'a> {
    config: &'a ProvisionerConfig,
    deps: Collaborators<'a>,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a ProvisionerConfig, deps: Collaborators<'a>) -> Self {
        Self { config, deps }
    }

    /// Trust secret for a node
    pub fn trust_secret(&self, identity: &NodeIdentity) -> String {
        derive_trust_secret(&self.config.trust_seed, &identity.system_id, &identity.name)
    }

    /// Run the phases selected by the configured action
    pub async fn run(&self) -> Result<PipelineReport, ControllerError> {
        let span = info_span!(
            "pipeline",
            node = %self.config.node_name,
            system_id = tracing::field::Empty
        );
        self.run_phases().instrument(span).await
    }

    async fn run_phases(&self) -> Result<PipelineReport, ControllerError> {
        let action = self.config.action;
        let node = self.deps.nodes.get_node(&self.config.node_name).await?;
        let resolver = FactResolver::new(self.deps.maas, self.config);

        if node.is_provisioned() {
            info!("Node {} already carries the completion label, skipping provisioning", node.name);
            let mut report = PipelineReport::short_circuit();
            let mut warnings = Warnings::default();
            // Only the trust refresh needs the identity from here on
            match resolver.resolve_identity(&node) {
                Ok(identity) => {
                    tracing::Span::current().record("system_id", identity.system_id.as_str());
                    report.identity = Some(identity);
                }
                Err(e) => warnings.push(
                    WarningKind::FactResolution,
                    format!("cannot resolve identity of labelled node: {}", e),
                ),
            }
            report.warnings = warnings.into_vec();
            return Ok(report);
        }

        let identity = resolver.resolve_identity(&node)?;
        tracing::Span::current().record("system_id", identity.system_id.as_str());
        info!("Provisioning {} with action {:?}", identity, action);

        let mut warnings = Warnings::default();
        let mut report = PipelineReport::default();
        let facts = resolver.resolve_or_default(&identity, &mut warnings).await;
        let placement = Placement::merge(&facts, self.config);
        let secret = self.trust_secret(&identity);

        if action.runs_initialization() {
            let nic = decide_nic_policy(
                self.config.network.explicit_nic.as_ref(),
                &self.config.network.host_bridge,
                placement.boot_interface.as_deref(),
                self.deps.interfaces,
            );
            let desired = DesiredState::build(self.config, &identity, &placement, nic, secret.clone());
            let summary = HypervisorInitializer::new(self.config, self.deps.connector, self.deps.interfaces)
                .run(&desired, &mut warnings)
                .await?;
            report.initialization = Some(summary);
        }

        if action.runs_registration() {
            if action.runs_initialization() && !self.config.register_stagger.is_zero() {
                info!("Waiting {:?} before registering", self.config.register_stagger);
                tokio::time::sleep(self.config.register_stagger).await;
            }

            let registration = Registration {
                name: normalize_name(&identity.name),
                power_address: listen_address(&identity.ip_address, self.config.listen_port),
                password: secret,
                zone: placement.zone.clone(),
                pool: placement.pool.clone(),
                project: Some(self.config.project.clone()),
            };
            let outcome = HostRegistrar::new(self.deps.maas)
                .register_with_retry(&identity, &registration, self.config.register_attempts, &mut warnings)
                .await?;
            report.registration = Some(outcome);

            ReadinessValidator::new(self.deps.connector, &self.config.socket)
                .validate()
                .await?;
            report.validated = true;

            report.signal_published = CompletionPublisher::new(self.deps.nodes)
                .publish(&identity.name, &mut warnings)
                .await;
        }

        report.identity = Some(identity);
        report.warnings = warnings.into_vec();
        Ok(report)
    }
}
