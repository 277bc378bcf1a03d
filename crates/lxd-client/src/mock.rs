//! Mock LxdClient and ConfigApplier for unit testing
//!
//! `MockLxdClient` keeps storage pools, networks, profiles, projects and server
//! config in memory and records every call. `MockConfigApplier` writes applied
//! server config into a `MockLxdClient` so verify-after-write paths can be
//! exercised end to end.

use crate::applier::{ConfigApplier, ConfigChange};
use crate::error::LxdError;
use crate::lxd_trait::LxdClientTrait;
use crate::models::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// Mock LxdClient for testing
#[derive(Clone, Default)]
pub struct MockLxdClient {
    server_config: Arc<Mutex<HashMap<String, serde_json::Value>>>,
    storage_pools: Arc<Mutex<BTreeMap<String, StoragePool>>>,
    networks: Arc<Mutex<BTreeMap<String, Network>>>,
    profiles: Arc<Mutex<BTreeMap<String, ProfilesPost>>>,
    projects: Arc<Mutex<BTreeMap<String, ProjectsPost>>>,
    calls: Arc<Mutex<Vec<String>>>,
    unreachable: Arc<Mutex<bool>>,
    fail_updates: Arc<Mutex<bool>>,
    server_info_failures: Arc<Mutex<u32>>,
}

impl std::fmt::Debug for MockLxdClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLxdClient").finish_non_exhaustive()
    }
}

impl MockLxdClient {
    /// Create a new mock with a fresh daemon: only the `default` project and profile
    pub fn new() -> Self {
        let mock = Self::default();
        mock.projects.lock().unwrap().insert(
            "default".to_string(),
            ProjectsPost {
                name: "default".to_string(),
                ..Default::default()
            },
        );
        mock.profiles.lock().unwrap().insert(
            "default".to_string(),
            ProfilesPost {
                name: "default".to_string(),
                ..Default::default()
            },
        );
        mock
    }

    /// Add a storage pool to the mock store (for test setup)
    pub fn add_storage_pool(&self, pool: StoragePool) {
        self.storage_pools.lock().unwrap().insert(pool.name.clone(), pool);
    }

    /// Add a network to the mock store (for test setup)
    pub fn add_network(&self, network: Network) {
        self.networks.lock().unwrap().insert(network.name.clone(), network);
    }

    /// Add a profile to the mock store (for test setup)
    pub fn add_profile(&self, profile: ProfilesPost) {
        self.profiles.lock().unwrap().insert(profile.name.clone(), profile);
    }

    /// Set a raw server config value as `GET /1.0` would report it
    pub fn set_server_config(&self, key: &str, value: serde_json::Value) {
        self.server_config.lock().unwrap().insert(key.to_string(), value);
    }

    /// Make every call fail as if the socket were gone
    pub fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.lock().unwrap() = unreachable;
    }

    /// Fail the next `count` `server_info` calls as a restarting daemon would
    pub fn fail_next_server_info(&self, count: u32) {
        *self.server_info_failures.lock().unwrap() = count;
    }

    /// Make every update (PATCH) call fail
    pub fn set_fail_updates(&self, fail: bool) {
        *self.fail_updates.lock().unwrap() = fail;
    }

    pub fn storage_pool(&self, name: &str) -> Option<StoragePool> {
        self.storage_pools.lock().unwrap().get(name).cloned()
    }

    pub fn network(&self, name: &str) -> Option<Network> {
        self.networks.lock().unwrap().get(name).cloned()
    }

    pub fn profile(&self, name: &str) -> Option<ProfilesPost> {
        self.profiles.lock().unwrap().get(name).cloned()
    }

    pub fn has_project(&self, name: &str) -> bool {
        self.projects.lock().unwrap().contains_key(name)
    }

    pub fn server_config(&self, key: &str) -> Option<serde_json::Value> {
        self.server_config.lock().unwrap().get(key).cloned()
    }

    /// Recorded calls to the named operation with their argument, e.g.
    /// `update_storage_pool default {"size":"45GiB"}`
    pub fn calls_to(&self, op: &str) -> Vec<String> {
        let prefix = format!("{} ", op);
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == op || c.starts_with(&prefix))
            .cloned()
            .collect()
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.calls_to(op).len()
    }

    /// Total number of recorded calls
    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn record(&self, call: String) -> Result<(), LxdError> {
        self.calls.lock().unwrap().push(call);
        if *self.unreachable.lock().unwrap() {
            return Err(LxdError::Exec("unix socket not reachable".to_string()));
        }
        Ok(())
    }

    fn check_update(&self) -> Result<(), LxdError> {
        if *self.fail_updates.lock().unwrap() {
            return Err(LxdError::Api("update rejected".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl LxdClientTrait for MockLxdClient {
    async fn server_info(&self) -> Result<ServerInfo, LxdError> {
        self.record("server_info".to_string())?;
        {
            let mut failures = self.server_info_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(LxdError::Exec("daemon not ready".to_string()));
            }
        }
        Ok(ServerInfo {
            api_version: "1.0".to_string(),
            auth: "trusted".to_string(),
            config: self.server_config.lock().unwrap().clone(),
            environment: ServerEnvironment {
                server_name: "mock".to_string(),
                server_version: "5.21".to_string(),
            },
        })
    }

    async fn list_storage_pools(&self) -> Result<Vec<StoragePool>, LxdError> {
        self.record("list_storage_pools".to_string())?;
        Ok(self.storage_pools.lock().unwrap().values().cloned().collect())
    }

    async fn get_storage_pool(&self, name: &str) -> Result<StoragePool, LxdError> {
        self.record(format!("get_storage_pool {}", name))?;
        self.storage_pool(name)
            .ok_or_else(|| LxdError::NotFound(format!("Storage pool {} not found", name)))
    }

    async fn create_storage_pool(&self, pool: &StoragePoolsPost) -> Result<(), LxdError> {
        self.record(format!("create_storage_pool {}", pool.name))?;
        let mut pools = self.storage_pools.lock().unwrap();
        if pools.contains_key(&pool.name) {
            return Err(LxdError::Api(format!("Storage pool {} already exists", pool.name)));
        }
        pools.insert(
            pool.name.clone(),
            StoragePool {
                name: pool.name.clone(),
                driver: pool.driver.clone(),
                config: pool.config.clone(),
                status: "Created".to_string(),
            },
        );
        Ok(())
    }

    async fn update_storage_pool(&self, name: &str, patch: &ConfigPatch) -> Result<(), LxdError> {
        self.record(format!(
            "update_storage_pool {} {}",
            name,
            serde_json::to_string(&patch.config).unwrap_or_default()
        ))?;
        self.check_update()?;
        let mut pools = self.storage_pools.lock().unwrap();
        let pool = pools
            .get_mut(name)
            .ok_or_else(|| LxdError::NotFound(format!("Storage pool {} not found", name)))?;
        pool.config.extend(patch.config.clone());
        Ok(())
    }

    async fn list_networks(&self) -> Result<Vec<Network>, LxdError> {
        self.record("list_networks".to_string())?;
        Ok(self.networks.lock().unwrap().values().cloned().collect())
    }

    async fn get_network(&self, name: &str) -> Result<Network, LxdError> {
        self.record(format!("get_network {}", name))?;
        self.network(name)
            .ok_or_else(|| LxdError::NotFound(format!("Network {} not found", name)))
    }

    async fn create_network(&self, network: &NetworksPost) -> Result<(), LxdError> {
        self.record(format!("create_network {}", network.name))?;
        let mut networks = self.networks.lock().unwrap();
        if networks.contains_key(&network.name) {
            return Err(LxdError::Api(format!("Network {} already exists", network.name)));
        }
        networks.insert(
            network.name.clone(),
            Network {
                name: network.name.clone(),
                network_type: network.network_type.clone(),
                managed: true,
                config: network.config.clone(),
            },
        );
        Ok(())
    }

    async fn update_network(&self, name: &str, patch: &ConfigPatch) -> Result<(), LxdError> {
        self.record(format!(
            "update_network {} {}",
            name,
            serde_json::to_string(&patch.config).unwrap_or_default()
        ))?;
        self.check_update()?;
        let mut networks = self.networks.lock().unwrap();
        let network = networks
            .get_mut(name)
            .ok_or_else(|| LxdError::NotFound(format!("Network {} not found", name)))?;
        network.config.extend(patch.config.clone());
        Ok(())
    }

    async fn list_profiles(&self) -> Result<Vec<String>, LxdError> {
        self.record("list_profiles".to_string())?;
        Ok(self.profiles.lock().unwrap().keys().cloned().collect())
    }

    async fn create_profile(&self, profile: &ProfilesPost) -> Result<(), LxdError> {
        self.record(format!("create_profile {}", profile.name))?;
        let mut profiles = self.profiles.lock().unwrap();
        if profiles.contains_key(&profile.name) {
            return Err(LxdError::Api(format!("Profile {} already exists", profile.name)));
        }
        profiles.insert(profile.name.clone(), profile.clone());
        Ok(())
    }

    async fn list_projects(&self) -> Result<Vec<String>, LxdError> {
        self.record("list_projects".to_string())?;
        Ok(self.projects.lock().unwrap().keys().cloned().collect())
    }

    async fn create_project(&self, project: &ProjectsPost) -> Result<(), LxdError> {
        self.record(format!("create_project {}", project.name))?;
        let mut projects = self.projects.lock().unwrap();
        if projects.contains_key(&project.name) {
            return Err(LxdError::Api(format!("Project {} already exists", project.name)));
        }
        projects.insert(project.name.clone(), project.clone());
        Ok(())
    }
}

/// Mock ConfigApplier for testing
///
/// Applied `SetServerConfig` changes land in the linked `MockLxdClient`; secret
/// keys are stored as `true`, mirroring how LXD reports them.
#[derive(Clone, Default)]
pub struct MockConfigApplier {
    target: Option<MockLxdClient>,
    applied: Arc<Mutex<Vec<ConfigChange>>>,
    failures_remaining: Arc<Mutex<u32>>,
    fail_always: Arc<Mutex<bool>>,
    silently_drop_secrets: Arc<Mutex<bool>>,
}

impl std::fmt::Debug for MockConfigApplier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConfigApplier").finish_non_exhaustive()
    }
}

impl MockConfigApplier {
    /// Applier writing into `target`
    pub fn new(target: MockLxdClient) -> Self {
        Self {
            target: Some(target),
            ..Default::default()
        }
    }

    /// Fail the next `count` changes
    pub fn fail_next(&self, count: u32) {
        *self.failures_remaining.lock().unwrap() = count;
    }

    /// Fail every change
    pub fn set_fail_always(&self, fail: bool) {
        *self.fail_always.lock().unwrap() = fail;
    }

    /// Report success for secret keys without storing them
    pub fn set_silently_drop_secrets(&self, drop: bool) {
        *self.silently_drop_secrets.lock().unwrap() = drop;
    }

    /// Successfully applied changes, in order
    pub fn applied(&self) -> Vec<ConfigChange> {
        self.applied.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ConfigApplier for MockConfigApplier {
    fn name(&self) -> &str {
        "mock"
    }

    async fn apply(&self, change: &ConfigChange) -> Result<(), LxdError> {
        if *self.fail_always.lock().unwrap() {
            return Err(LxdError::Exec(format!("mock failure: {}", change.describe())));
        }
        {
            let mut remaining = self.failures_remaining.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(LxdError::Exec(format!("mock failure: {}", change.describe())));
            }
        }
        if let (Some(target), ConfigChange::SetServerConfig { key, value }) = (&self.target, change) {
            if key.contains("password") {
                if !*self.silently_drop_secrets.lock().unwrap() {
                    target.set_server_config(key, serde_json::Value::Bool(!value.is_empty()));
                }
            } else {
                target.set_server_config(key, serde_json::Value::String(value.clone()));
            }
        }
        self.applied.lock().unwrap().push(change.clone());
        Ok(())
    }
}
