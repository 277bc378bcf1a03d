//! Readiness validation
//!
//! Runs after registration and before the completion label. Reconnects to the
//! control socket from scratch rather than reusing the initializer's session,
//! so a daemon that did not come back after its restart is caught here.

use crate::config::SocketSettings;
use crate::error::ControllerError;
use crate::hypervisor::LxdConnector;
use crate::hypervisor::socket::first_existing;
use tracing::info;

/// What the validator observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readiness {
    pub server_version: String,
    pub storage_pools: usize,
    pub networks: usize,
}

pub struct ReadinessValidator<'a> {
    connector: &'a dyn LxdConnector,
    socket: &'a SocketSettings,
}

impl<'a> ReadinessValidator<'a> {
    pub fn new(connector: &'a dyn LxdConnector, socket: &'a SocketSettings) -> Self {
        Self { connector, socket }
    }

    /// Server answers, and has at least one storage pool and one network
    pub async fn validate(&self) -> Result<Readiness, ControllerError> {
        let socket = first_existing(&self.socket.candidates)
            .ok_or_else(|| ControllerError::ValidationFailure("no LXD control socket present".to_string()))?;
        let session = self.connector.connect(&socket);

        let info = session
            .lxd
            .server_info()
            .await
            .map_err(|e| ControllerError::ValidationFailure(format!("server info query failed: {}", e)))?;
        if info.api_version.is_empty() {
            return Err(ControllerError::ValidationFailure(
                "server info reports no API version".to_string(),
            ));
        }

        let storage_pools = session
            .lxd
            .list_storage_pools()
            .await
            .map_err(|e| ControllerError::ValidationFailure(format!("listing storage pools failed: {}", e)))?
            .len();
        if storage_pools == 0 {
            return Err(ControllerError::ValidationFailure("no storage pools defined".to_string()));
        }

        let networks = session
            .lxd
            .list_networks()
            .await
            .map_err(|e| ControllerError::ValidationFailure(format!("listing networks failed: {}", e)))?
            .len();
        if networks == 0 {
            return Err(ControllerError::ValidationFailure("no networks defined".to_string()));
        }

        let readiness = Readiness {
            server_version: info.environment.server_version,
            storage_pools,
            networks,
        };
        info!(
            "Hypervisor ready: LXD {}, {} storage pools, {} networks",
            readiness.server_version, readiness.storage_pools, readiness.networks
        );
        Ok(readiness)
    }
}
