//! Hypervisor Node Controller
//!
//! Runs on every hypervisor node (typically as a DaemonSet pod) and turns the
//! freshly deployed host into a MAAS-managed LXD VM host:
//! - Resolves the node's identity and inventory facts
//! - Initializes the local LXD daemon (storage, network, profile, listener)
//! - Registers the daemon with MAAS as a VM host
//! - Validates the daemon and labels the Kubernetes Node as complete
//!
//! Every step is idempotent, so the process can be restarted at any point.

mod backoff;
mod config;
mod error;
mod facts;
mod hypervisor;
mod identity;
mod maintenance;
mod nic;
mod pipeline;
#[cfg(test)]
mod pipeline_test;
mod readiness;
mod registrar;
mod report;
mod signal;
#[cfg(test)]
mod test_utils;
mod trust;

use crate::config::{Cli, ProvisionerConfig};
use crate::error::ControllerError;
use crate::hypervisor::{ExecConnector, LxdConnector};
use crate::nic::SysfsInterfaces;
use crate::pipeline::{Collaborators, Pipeline};
use crate::report::WarningKind;
use crate::signal::KubeNodeStore;
use clap::Parser;
use kube::Client;
use maas_client::MaasClient;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube and reqwest both link rustls; pick one provider for the process
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = ProvisionerConfig::try_from(Cli::parse())?;

    info!("Starting Hypervisor Node Controller");
    info!("Configuration:");
    info!("  Node: {}", config.node_name);
    info!("  Action: {:?}", config.action);
    info!("  MAAS URL: {}", config.maas_url);
    info!("  Storage driver: {}", config.storage.driver);
    info!("  LXD project: {}", config.project);

    let kube_client = Client::try_default().await?;
    let nodes = KubeNodeStore::new(kube_client);
    let maas = MaasClient::new(config.maas_url.clone(), &config.maas_api_key)?;
    let connector: Arc<dyn LxdConnector> = Arc::new(ExecConnector::default());
    let interfaces = SysfsInterfaces::new(config.sysfs_root.clone());

    let pipeline = Pipeline::new(
        &config,
        Collaborators {
            nodes: &nodes,
            maas: &maas,
            connector: connector.as_ref(),
            interfaces: &interfaces,
        },
    );
    let report = pipeline.run().await?;

    if report.short_circuited {
        info!("Node already provisioned");
    } else {
        info!(
            "Provisioning finished: initialized={}, registration={:?}, validated={}, labelled={}",
            report.initialization.is_some(),
            report.registration,
            report.validated,
            report.signal_published
        );
    }
    if !report.warnings.is_empty() {
        warn!("{} warnings during provisioning:", report.warnings.len());
        for warning in &report.warnings {
            warn!("  [{}] {}", warning.kind, warning.message);
        }
    }
    if report.warning_count(WarningKind::SignalPublish) > 0 {
        warn!("Completion label not written, the next run will retry it");
    }

    if !config.action.keeps_alive() {
        return Ok(());
    }

    if config.action.refreshes_trust() {
        if let Some(identity) = &report.identity {
            maintenance::spawn_trust_refresh(
                Arc::clone(&connector),
                config.socket.clone(),
                pipeline.trust_secret(identity),
                config.trust_refresh,
            );
        } else {
            warn!("Node identity unknown, periodic trust refresh disabled");
        }
    }

    maintenance::keep_alive().await;
    Ok(())
}
