//! Host registration
//!
//! Ensures exactly one MAAS VM host exists for this node's system id. MAAS
//! does not enforce that uniqueness, so it is decided here from a listing of
//! all VM hosts:
//!
//! 1. A host with our normalized name is ours if it has no system id or our
//!    system id; otherwise the name is taken and registration fails.
//! 2. A host with our system id under another name is ours.
//! 3. Otherwise a new host is created and checked for drift.
//!
//! The list-then-create is not atomic across nodes. A racing create surfaces
//! either as a MAAS conflict, which is retried from the listing, or as a
//! drifted system id on the created host, which fails the run.

use crate::backoff::FibonacciBackoff;
use crate::error::ControllerError;
use crate::identity::NodeIdentity;
use crate::report::{WarningKind, Warnings};
use maas_client::{MaasClientTrait, MaasError, VmHost, VmHostCreateRequest, VmHostUpdateRequest};
use tracing::{debug, info, warn};

/// Name used when a node name normalizes to nothing
pub const PLACEHOLDER_NAME: &str = "unnamed-host";

/// Lowercase, collapse every run of non-alphanumerics into `-`, trim `-`
pub fn normalize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_separator = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push('-');
            }
            pending_separator = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }
    if out.is_empty() {
        PLACEHOLDER_NAME.to_string()
    } else {
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// An existing VM host already represents this node
    AlreadyRegistered { id: u64, name: String },
    /// A VM host was created; `corrected` when a drift update followed
    Created { id: u64, name: String, corrected: bool },
}

/// What to register
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub name: String,
    pub power_address: String,
    pub password: String,
    pub zone: Option<String>,
    pub pool: Option<String>,
    pub project: Option<String>,
}

impl Registration {
    fn to_request(&self) -> VmHostCreateRequest {
        VmHostCreateRequest {
            name: self.name.clone(),
            power_address: self.power_address.clone(),
            password: Some(self.password.clone()),
            zone: self.zone.clone(),
            pool: self.pool.clone(),
            project: self.project.clone(),
        }
    }
}

/// Apply the matching rules to a VM host listing
pub fn find_existing<'h>(
    hosts: &'h [VmHost],
    name: &str,
    system_id: &str,
) -> Result<Option<&'h VmHost>, ControllerError> {
    if let Some(host) = hosts.iter().find(|h| h.name == name) {
        let owner = host.system_id();
        if owner.is_empty() || owner == system_id {
            return Ok(Some(host));
        }
        return Err(ControllerError::RegistrationConflict(format!(
            "VM host {} (id {}) belongs to machine {}, not {}",
            host.name, host.id, owner, system_id
        )));
    }
    Ok(hosts.iter().find(|h| h.system_id() == system_id))
}

/// Fields of a created host that did not take the requested value
fn drift(requested: &Registration, actual: &VmHost) -> VmHostUpdateRequest {
    fn differs(want: Option<&String>, have: Option<&str>) -> Option<String> {
        want.filter(|w| have != Some(w.as_str())).cloned()
    }
    VmHostUpdateRequest {
        zone: differs(requested.zone.as_ref(), actual.zone_name()),
        pool: differs(requested.pool.as_ref(), actual.pool_name()),
        project: differs(requested.project.as_ref(), actual.project.as_deref()),
    }
}

/// Registers the local hypervisor with MAAS
pub struct HostRegistrar<'a> {
    maas: &'a dyn MaasClientTrait,
}

impl<'a> HostRegistrar<'a> {
    pub fn new(maas: &'a dyn MaasClientTrait) -> Self {
        Self { maas }
    }

    /// One pass of list, match, create, drift-check
    pub async fn register(
        &self,
        identity: &NodeIdentity,
        registration: &Registration,
        warnings: &mut Warnings,
    ) -> Result<RegistrationOutcome, ControllerError> {
        let hosts = self.maas.list_vm_hosts().await?;
        debug!("MAAS lists {} VM hosts", hosts.len());

        if let Some(host) = find_existing(&hosts, &registration.name, &identity.system_id)? {
            info!(
                "VM host {} (id {}) already registered for {}",
                host.name, host.id, identity.system_id
            );
            return Ok(RegistrationOutcome::AlreadyRegistered {
                id: host.id,
                name: host.name.clone(),
            });
        }

        info!(
            "Registering VM host {} at {} for {}",
            registration.name, registration.power_address, identity.system_id
        );
        let created = self.maas.create_vm_host(&registration.to_request()).await?;
        let corrected = self.correct_drift(identity, registration, &created, warnings).await?;

        Ok(RegistrationOutcome::Created {
            id: created.id,
            name: created.name,
            corrected,
        })
    }

    async fn correct_drift(
        &self,
        identity: &NodeIdentity,
        registration: &Registration,
        created: &VmHost,
        warnings: &mut Warnings,
    ) -> Result<bool, ControllerError> {
        let actual = match self.maas.get_vm_host(created.id).await {
            Ok(host) => host,
            Err(e) => {
                warnings.push(
                    WarningKind::Configuration,
                    format!("could not re-read VM host {} for drift check: {}", created.id, e),
                );
                return Ok(false);
            }
        };

        let owner = actual.system_id();
        if !owner.is_empty() && owner != identity.system_id {
            return Err(ControllerError::RegistrationConflict(format!(
                "created VM host {} (id {}) is linked to machine {}, not {}",
                actual.name, actual.id, owner, identity.system_id
            )));
        }

        let update = drift(registration, &actual);
        if update.is_empty() {
            return Ok(false);
        }
        info!("Correcting VM host {} placement: {:?}", actual.id, update);
        match self.maas.update_vm_host(actual.id, &update).await {
            Ok(_) => Ok(true),
            Err(e) => {
                warnings.push(
                    WarningKind::Configuration,
                    format!("failed to correct VM host {} placement: {}", actual.id, e),
                );
                Ok(false)
            }
        }
    }

    /// Register with bounded retries on transient MAAS failures
    ///
    /// A duplicate-name rejection on create means another writer got there
    /// first; the next attempt re-lists and applies the matching rules again.
    pub async fn register_with_retry(
        &self,
        identity: &NodeIdentity,
        registration: &Registration,
        attempts: u32,
        warnings: &mut Warnings,
    ) -> Result<RegistrationOutcome, ControllerError> {
        let mut backoff = FibonacciBackoff::for_registration();
        let mut attempt = 1;
        loop {
            match self.register(identity, registration, warnings).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if attempt < attempts && is_retriable(&e) => {
                    let delay = backoff.next_backoff();
                    warn!(
                        "Registration attempt {}/{} failed: {}; retrying in {:?}",
                        attempt, attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn is_retriable(error: &ControllerError) -> bool {
    error.is_transient() || matches!(error, ControllerError::Maas(MaasError::Conflict(_)))
}
