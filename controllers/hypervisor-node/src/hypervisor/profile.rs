//! EnsureProfile
//!
//! The VM profile is created once and never reconciled afterwards: a changed
//! NIC parent or pool name does not rewrite an existing profile, so running
//! VMs are not disturbed. Failures here degrade to warnings.

use crate::nic::NicPolicy;
use crate::report::{WarningKind, Warnings};
use lxd_client::{Devices, LxdClientTrait, ProfilesPost, ProjectsPost};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Name of the profile MAAS-composed VMs use
pub const PROFILE_NAME: &str = "maas-kvm";

/// NIC device name inside the guest
const GUEST_NIC: &str = "eth0";

/// Desired VM profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSpec {
    pub name: String,
    pub pool: String,
    pub nic: NicPolicy,
}

impl ProfileSpec {
    pub fn new(pool: impl Into<String>, nic: NicPolicy) -> Self {
        Self {
            name: PROFILE_NAME.to_string(),
            pool: pool.into(),
            nic,
        }
    }

    pub fn devices(&self) -> Devices {
        let root = BTreeMap::from([
            ("type".to_string(), "disk".to_string()),
            ("path".to_string(), "/".to_string()),
            ("pool".to_string(), self.pool.clone()),
        ]);
        let nic = BTreeMap::from([
            ("type".to_string(), "nic".to_string()),
            ("nictype".to_string(), self.nic.mode.as_str().to_string()),
            ("parent".to_string(), self.nic.parent.clone()),
            ("name".to_string(), GUEST_NIC.to_string()),
        ]);
        BTreeMap::from([("root".to_string(), root), (GUEST_NIC.to_string(), nic)])
    }

    fn to_post(&self) -> ProfilesPost {
        ProfilesPost {
            name: self.name.clone(),
            description: "MAAS KVM guests".to_string(),
            config: BTreeMap::new(),
            devices: self.devices(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileOutcome {
    Created,
    Exists,
    Failed,
}

/// Create the project MAAS composes VMs in, if missing
///
/// The project shares the default project's profiles so `maas-kvm` applies.
pub async fn ensure_project(lxd: &dyn LxdClientTrait, project: &str, warnings: &mut Warnings) {
    if project.is_empty() || project == "default" {
        return;
    }
    let projects = match lxd.list_projects().await {
        Ok(projects) => projects,
        Err(e) => {
            warnings.push(WarningKind::Configuration, format!("failed to list projects: {}", e));
            return;
        }
    };
    if projects.iter().any(|p| p == project) {
        debug!("Project {} exists", project);
        return;
    }

    let post = ProjectsPost {
        name: project.to_string(),
        description: "MAAS managed VMs".to_string(),
        config: BTreeMap::from([("features.profiles".to_string(), "false".to_string())]),
    };
    match lxd.create_project(&post).await {
        Ok(()) => info!("Created project {}", project),
        Err(e) => warnings.push(
            WarningKind::Configuration,
            format!("failed to create project {}: {}", project, e),
        ),
    }
}

/// Create the profile unless one of that name exists
pub async fn ensure_profile(lxd: &dyn LxdClientTrait, spec: &ProfileSpec, warnings: &mut Warnings) -> ProfileOutcome {
    let profiles = match lxd.list_profiles().await {
        Ok(profiles) => profiles,
        Err(e) => {
            warnings.push(WarningKind::Configuration, format!("failed to list profiles: {}", e));
            return ProfileOutcome::Failed;
        }
    };
    if profiles.iter().any(|p| *p == spec.name) {
        debug!("Profile {} exists, not reconciling its contents", spec.name);
        return ProfileOutcome::Exists;
    }

    match lxd.create_profile(&spec.to_post()).await {
        Ok(()) => {
            info!("Created profile {} (pool {}, NIC {})", spec.name, spec.pool, spec.nic);
            ProfileOutcome::Created
        }
        Err(e) => {
            warnings.push(
                WarningKind::Configuration,
                format!("failed to create profile {}: {}", spec.name, e),
            );
            ProfileOutcome::Failed
        }
    }
}
