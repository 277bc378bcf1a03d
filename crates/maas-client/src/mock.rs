//! Mock MaasClient for unit testing
//!
//! This module provides a mock implementation of MaasClientTrait that can be used
//! in unit tests without requiring a running MAAS region controller.

use crate::common::classify;
use crate::error::MaasError;
use crate::maas_trait::MaasClientTrait;
use crate::models::*;
use reqwest::StatusCode;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// Mock MaasClient for testing
///
/// This mock stores machines and VM hosts in memory, records every call, and
/// can be configured to fail or to misbehave on create.
#[derive(Clone, Default)]
pub struct MockMaasClient {
    base_url: String,
    machines: Arc<Mutex<HashMap<String, Machine>>>,
    vm_hosts: Arc<Mutex<BTreeMap<u64, VmHost>>>,
    calls: Arc<Mutex<Vec<String>>>,
    unreachable: Arc<Mutex<bool>>,
    transient_create_failures: Arc<Mutex<u32>>,
    create_drops_placement: Arc<Mutex<bool>>,
    created_host_system_id: Arc<Mutex<Option<String>>>,
    concurrent_registration: Arc<Mutex<Option<VmHost>>>,
    next_id: Arc<Mutex<u64>>,
}

impl std::fmt::Debug for MockMaasClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockMaasClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl MockMaasClient {
    /// Create a new mock client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            next_id: Arc::new(Mutex::new(1)),
            ..Default::default()
        }
    }

    /// Add a machine to the mock store (for test setup)
    pub fn add_machine(&self, machine: Machine) {
        self.machines
            .lock()
            .unwrap()
            .insert(machine.system_id.clone(), machine);
    }

    /// Add a VM host to the mock store (for test setup)
    pub fn add_vm_host(&self, vm_host: VmHost) {
        let mut next = self.next_id.lock().unwrap();
        if vm_host.id >= *next {
            *next = vm_host.id + 1;
        }
        self.vm_hosts.lock().unwrap().insert(vm_host.id, vm_host);
    }

    /// Make every call fail as if MAAS were down
    pub fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.lock().unwrap() = unreachable;
    }

    /// Fail the next `count` create calls with a transient error
    pub fn fail_next_creates(&self, count: u32) {
        *self.transient_create_failures.lock().unwrap() = count;
    }

    /// Simulate MAAS ignoring zone, pool and project on create
    pub fn set_create_drops_placement(&self, drops: bool) {
        *self.create_drops_placement.lock().unwrap() = drops;
    }

    /// Simulate MAAS linking created VM hosts to the given machine
    pub fn set_created_host_system_id(&self, system_id: Option<&str>) {
        *self.created_host_system_id.lock().unwrap() = system_id.map(str::to_string);
    }

    /// Have another writer store `vm_host` just before the next create lands
    pub fn set_concurrent_registration(&self, vm_host: VmHost) {
        *self.concurrent_registration.lock().unwrap() = Some(vm_host);
    }

    /// All VM hosts currently stored
    pub fn vm_hosts(&self) -> Vec<VmHost> {
        self.vm_hosts.lock().unwrap().values().cloned().collect()
    }

    /// Number of recorded calls to the named operation
    pub fn call_count(&self, op: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == op).count()
    }

    /// Total number of recorded calls
    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn record(&self, op: &str) -> Result<(), MaasError> {
        self.calls.lock().unwrap().push(op.to_string());
        if *self.unreachable.lock().unwrap() {
            return Err(MaasError::Unavailable(format!("{}: MAAS unreachable", op)));
        }
        Ok(())
    }

    fn next_id(&self) -> u64 {
        let mut id = self.next_id.lock().unwrap();
        let current = *id;
        *id += 1;
        current
    }
}

#[async_trait::async_trait]
impl MaasClientTrait for MockMaasClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_machine(&self, system_id: &str) -> Result<Machine, MaasError> {
        self.record("get_machine")?;
        self.machines
            .lock()
            .unwrap()
            .get(system_id)
            .cloned()
            .ok_or_else(|| MaasError::NotFound(format!("Machine {} not found", system_id)))
    }

    async fn list_vm_hosts(&self) -> Result<Vec<VmHost>, MaasError> {
        self.record("list_vm_hosts")?;
        Ok(self.vm_hosts())
    }

    async fn get_vm_host(&self, id: u64) -> Result<VmHost, MaasError> {
        self.record("get_vm_host")?;
        self.vm_hosts
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| MaasError::NotFound(format!("VM host {} not found", id)))
    }

    async fn create_vm_host(&self, request: &VmHostCreateRequest) -> Result<VmHost, MaasError> {
        self.record("create_vm_host")?;
        {
            let mut failures = self.transient_create_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(MaasError::Unavailable("create_vm_host: 503".to_string()));
            }
        }
        let concurrent = self.concurrent_registration.lock().unwrap().take();
        if let Some(vm_host) = concurrent {
            self.add_vm_host(vm_host);
        }
        if self
            .vm_hosts
            .lock()
            .unwrap()
            .values()
            .any(|h| h.name == request.name)
        {
            // MAAS answers a duplicate name with a form validation error
            return Err(classify(
                "POST",
                "/api/2.0/pods/",
                StatusCode::BAD_REQUEST,
                r#"{"name": ["Pod with this Name already exists."]}"#.to_string(),
            ));
        }

        let drops = *self.create_drops_placement.lock().unwrap();
        let host = self
            .created_host_system_id
            .lock()
            .unwrap()
            .clone()
            .map(|system_id| HostRef { system_id });
        let vm_host = VmHost {
            id: self.next_id(),
            name: request.name.clone(),
            host_type: "lxd".to_string(),
            host,
            power_address: Some(request.power_address.clone()),
            zone: if drops { None } else { request.zone.clone().map(NamedRef::new) },
            pool: if drops { None } else { request.pool.clone().map(NamedRef::new) },
            project: if drops { None } else { request.project.clone() },
        };
        self.vm_hosts.lock().unwrap().insert(vm_host.id, vm_host.clone());
        Ok(vm_host)
    }

    async fn update_vm_host(&self, id: u64, request: &VmHostUpdateRequest) -> Result<VmHost, MaasError> {
        self.record("update_vm_host")?;
        let mut hosts = self.vm_hosts.lock().unwrap();
        let host = hosts
            .get_mut(&id)
            .ok_or_else(|| MaasError::NotFound(format!("VM host {} not found", id)))?;
        if let Some(zone) = &request.zone {
            host.zone = Some(NamedRef::new(zone.clone()));
        }
        if let Some(pool) = &request.pool {
            host.pool = Some(NamedRef::new(pool.clone()));
        }
        if let Some(project) = &request.project {
            host.project = Some(project.clone());
        }
        Ok(host.clone())
    }
}
