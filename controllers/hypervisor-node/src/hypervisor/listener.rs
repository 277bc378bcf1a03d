//! ConfigureListener
//!
//! Binds the LXD remote API to the node's own address, enforces the trust
//! secret and restarts the daemon so the listener change takes effect.

use crate::error::ControllerError;
use crate::trust::TrustEnforcer;
use lxd_client::{ConfigApplier, ConfigChange};
use std::net::IpAddr;
use tracing::info;

/// LXD server config key for the remote API listener
pub const HTTPS_ADDRESS_KEY: &str = "core.https_address";

/// `ip:port`, bracketing IPv6 addresses
pub fn listen_address(ip: &str, port: u16) -> String {
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) => format!("[{}]:{}", v6, port),
        _ => format!("{}:{}", ip, port),
    }
}

/// Apply listener address and trust secret, then restart the daemon
pub async fn configure_listener(
    applier: &dyn ConfigApplier,
    trust: &TrustEnforcer<'_>,
    address: &str,
) -> Result<(), ControllerError> {
    info!("Binding LXD API to {}", address);
    applier
        .apply(&ConfigChange::set(HTTPS_ADDRESS_KEY, address))
        .await?;

    trust.enforce().await?;

    info!("Restarting LXD to apply listener configuration");
    applier.apply(&ConfigChange::RestartDaemon).await?;
    Ok(())
}
