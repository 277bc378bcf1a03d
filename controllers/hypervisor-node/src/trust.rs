//! Trust secret
//!
//! The secret lets MAAS add the local LXD daemon as a trusted remote. It is
//! derived per node, written through the [`ConfigApplier`] capability and only
//! considered enforced once the daemon reports it as set.

use crate::error::ControllerError;
use lxd_client::{ConfigApplier, ConfigChange, LxdClientTrait};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

/// LXD server config key holding the trust password
pub const TRUST_PASSWORD_KEY: &str = "core.trust_password";

/// `hex(sha256(seed ":" system_id ":" node_name))`
pub fn derive_trust_secret(seed: &str, system_id: &str, node_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(b":");
    hasher.update(system_id.as_bytes());
    hasher.update(b":");
    hasher.update(node_name.as_bytes());
    hex::encode(hasher.finalize())
}

/// Writes the trust secret and verifies it took effect
pub struct TrustEnforcer<'a> {
    lxd: &'a dyn LxdClientTrait,
    applier: &'a dyn ConfigApplier,
    secret: &'a str,
}

impl<'a> TrustEnforcer<'a> {
    pub fn new(lxd: &'a dyn LxdClientTrait, applier: &'a dyn ConfigApplier, secret: &'a str) -> Self {
        Self { lxd, applier, secret }
    }

    /// Set the secret, then read the presence flag back
    ///
    /// A write that cannot be verified is reported as `TrustNotEnforced`.
    pub async fn enforce(&self) -> Result<(), ControllerError> {
        self.applier
            .apply(&ConfigChange::set(TRUST_PASSWORD_KEY, self.secret))
            .await?;
        debug!("Trust secret written via '{}' applier", self.applier.name());

        let info = self.lxd.server_info().await?;
        if !info.trust_password_set() {
            return Err(ControllerError::TrustNotEnforced(format!(
                "{} does not read back as set",
                TRUST_PASSWORD_KEY
            )));
        }
        info!("Trust secret enforced and verified");
        Ok(())
    }
}
