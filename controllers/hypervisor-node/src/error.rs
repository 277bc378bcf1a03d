//! Controller-specific error types.
//!
//! Fatal outcomes of a provisioning run. Non-fatal outcomes are recorded as
//! [`crate::report::ProvisionWarning`] instead and never surface here.

use kube::Error as KubeError;
use lxd_client::LxdError;
use maas_client::MaasError;
use thiserror::Error;

/// Errors that can occur in the hypervisor node controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// MAAS API error
    #[error("MAAS error: {0}")]
    Maas(#[from] MaasError),

    /// LXD API or command error
    #[error("LXD error: {0}")]
    Lxd(#[from] LxdError),

    /// Node identity or inventory facts could not be resolved
    #[error("Fact resolution failed: {0}")]
    FactResolution(String),

    /// Inventory reported data that cannot be used for sizing
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// No LXD control socket appeared in time
    #[error("Timed out waiting for LXD control socket: {0}")]
    SocketTimeout(String),

    /// Trust secret was written but does not read back as set
    #[error("Trust secret not enforced: {0}")]
    TrustNotEnforced(String),

    /// A VM host record belongs to a different machine
    #[error("Registration conflict: {0}")]
    RegistrationConflict(String),

    /// Hypervisor failed readiness checks after registration
    #[error("Readiness validation failed: {0}")]
    ValidationFailure(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ControllerError {
    /// Whether a registration attempt that failed with this error may be retried
    pub fn is_transient(&self) -> bool {
        match self {
            ControllerError::Maas(e) => e.is_transient(),
            _ => false,
        }
    }
}
