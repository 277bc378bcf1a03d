//! Hypervisor initialization
//!
//! Converges the local LXD daemon through a fixed sequence of stages:
//! `WaitForControlSocket -> EnsureStoragePool -> EnsureNetwork -> EnsureProfile
//! -> ConfigureListener`. Every stage reads live state first and only writes
//! what differs. Nothing is ever deleted.

pub mod listener;
pub mod network;
pub mod profile;
pub mod socket;
pub mod storage;

use crate::config::ProvisionerConfig;
use crate::error::ControllerError;
use crate::facts::Placement;
use crate::identity::NodeIdentity;
use crate::nic::{HostInterfaces, NicPolicy};
use crate::report::Warnings;
use crate::trust::TrustEnforcer;
use listener::{configure_listener, listen_address};
use lxd_client::{
    CommandRunner, ConfigApplier, ExecApplier, HostNamespaceRunner, LocalRunner, LxdClient, LxdClientTrait,
    ProbingApplier,
};
use network::{NetworkOutcome, NetworkSpec, ensure_network};
use profile::{ProfileOutcome, ProfileSpec, ensure_profile, ensure_project};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storage::{StorageOutcome, StoragePoolSpec, ensure_storage_pool};
use tracing::info;

/// Initialization stages, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStage {
    WaitForControlSocket,
    EnsureStoragePool,
    EnsureNetwork,
    EnsureProfile,
    ConfigureListener,
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A connection to the daemon behind one control socket
#[derive(Clone)]
pub struct HypervisorSession {
    pub socket: PathBuf,
    pub lxd: Arc<dyn LxdClientTrait>,
    pub applier: Arc<dyn ConfigApplier>,
}

impl fmt::Debug for HypervisorSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HypervisorSession")
            .field("socket", &self.socket)
            .field("applier", &self.applier)
            .finish_non_exhaustive()
    }
}

/// Builds sessions for a discovered control socket
pub trait LxdConnector: Send + Sync {
    fn connect(&self, socket: &Path) -> HypervisorSession;

    /// Runner for read-only diagnostics when no socket appears
    fn diagnostics_runner(&self) -> Arc<dyn CommandRunner>;
}

/// Production connector: `lxc` in the local namespaces for API calls, and
/// configuration changes tried in turn across local and host-namespace execution
#[derive(Debug, Clone, Default)]
pub struct ExecConnector {
    runner: LocalRunner,
}

impl LxdConnector for ExecConnector {
    fn connect(&self, socket: &Path) -> HypervisorSession {
        let local: Arc<dyn CommandRunner> = Arc::new(self.runner.clone());
        let host: Arc<dyn CommandRunner> = Arc::new(HostNamespaceRunner::new(self.runner.clone()));
        let lxd_dir = socket::lxd_dir(socket);

        let strategies: Vec<Arc<dyn ConfigApplier>> = vec![
            Arc::new(ExecApplier::new("direct", Arc::clone(&local), lxd_dir.clone())),
            Arc::new(ExecApplier::new("host-namespace", host, lxd_dir)),
        ];
        HypervisorSession {
            socket: socket.to_path_buf(),
            lxd: Arc::new(LxdClient::for_socket(local, socket)),
            applier: Arc::new(ProbingApplier::new(strategies)),
        }
    }

    fn diagnostics_runner(&self) -> Arc<dyn CommandRunner> {
        Arc::new(HostNamespaceRunner::new(self.runner.clone()))
    }
}

/// The state initialization converges to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredState {
    pub storage: StoragePoolSpec,
    pub network: NetworkSpec,
    pub profile: ProfileSpec,
    pub project: String,
    pub listen_address: String,
    pub trust_secret: String,
}

impl DesiredState {
    pub fn build(
        config: &ProvisionerConfig,
        identity: &NodeIdentity,
        placement: &Placement,
        nic: NicPolicy,
        trust_secret: String,
    ) -> Self {
        let storage = StoragePoolSpec::new(config.storage.driver.clone(), placement.storage_gib);
        let profile = ProfileSpec::new(storage.name.clone(), nic);
        Self {
            storage,
            network: NetworkSpec {
                name: config.network.bridge.clone(),
                skip_update: config.network.skip_update,
            },
            profile,
            project: config.project.clone(),
            listen_address: listen_address(&identity.ip_address, config.listen_port),
            trust_secret,
        }
    }
}

/// What initialization did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitSummary {
    pub storage: StorageOutcome,
    pub network: NetworkOutcome,
    pub profile: ProfileOutcome,
}

/// Brings the local daemon to the desired state
pub struct HypervisorInitializer<'a> {
    config: &'a ProvisionerConfig,
    connector: &'a dyn LxdConnector,
    interfaces: &'a dyn HostInterfaces,
}

impl<'a> HypervisorInitializer<'a> {
    pub fn new(
        config: &'a ProvisionerConfig,
        connector: &'a dyn LxdConnector,
        interfaces: &'a dyn HostInterfaces,
    ) -> Self {
        Self {
            config,
            connector,
            interfaces,
        }
    }

    pub async fn run(&self, desired: &DesiredState, warnings: &mut Warnings) -> Result<InitSummary, ControllerError> {
        let diagnostics = self.connector.diagnostics_runner();

        enter(InitStage::WaitForControlSocket);
        let socket = socket::wait_or_diagnose(&self.config.socket, diagnostics.as_ref()).await?;
        let session = self.connector.connect(&socket);
        let lxd = session.lxd.as_ref();

        enter(InitStage::EnsureStoragePool);
        let storage = ensure_storage_pool(lxd, &desired.storage, warnings).await?;

        enter(InitStage::EnsureNetwork);
        let network = ensure_network(lxd, &desired.network, &desired.profile.nic, self.interfaces, warnings).await?;

        enter(InitStage::EnsureProfile);
        ensure_project(lxd, &desired.project, warnings).await;
        let profile = ensure_profile(lxd, &desired.profile, warnings).await;

        enter(InitStage::ConfigureListener);
        let trust = TrustEnforcer::new(lxd, session.applier.as_ref(), &desired.trust_secret);
        configure_listener(session.applier.as_ref(), &trust, &desired.listen_address).await?;
        socket::wait_or_diagnose(&self.config.socket, diagnostics.as_ref()).await?;
        socket::wait_for_daemon(&self.config.socket, lxd, diagnostics.as_ref()).await?;

        info!("Hypervisor initialized: storage {:?}, network {:?}, profile {:?}", storage, network, profile);
        Ok(InitSummary {
            storage,
            network,
            profile,
        })
    }
}

fn enter(stage: InitStage) {
    info!("Stage {}", stage);
}
