//! MAAS API client
//!
//! Implements the MAAS 2.0 REST API client for machine lookup and VM host
//! registration. Based on the MAAS handlers under /api/2.0/machines/ and
//! /api/2.0/pods/.

use crate::auth::MaasApiKey;
use crate::common::HttpClient;
use crate::error::MaasError;
use crate::maas_trait::MaasClientTrait;
use crate::models::*;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// MAAS API client
#[derive(Debug, Clone)]
pub struct MaasClient {
    http: HttpClient,
}

impl MaasClient {
    /// Create a new MAAS client
    ///
    /// # Arguments
    /// * `base_url` - MAAS base URL including the `/MAAS` prefix (e.g., "http://maas:5240/MAAS")
    /// * `api_key` - API key in `consumer:token:secret` form
    pub fn new(base_url: String, api_key: &str) -> Result<Self, MaasError> {
        let key = MaasApiKey::parse(api_key)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(MaasError::Http)?;

        Ok(Self {
            http: HttpClient::new(client, base_url, key),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        self.http.base_url()
    }

    /// Get a machine by system ID
    ///
    /// # Returns
    /// * `Ok(Machine)` - The machine object
    /// * `Err(MaasError::NotFound)` - If MAAS has no such machine
    pub async fn get_machine(&self, system_id: &str) -> Result<Machine, MaasError> {
        if system_id.is_empty() {
            return Err(MaasError::InvalidRequest("system_id must not be empty".to_string()));
        }
        debug!("Fetching machine {} from MAAS", system_id);
        self.http
            .get(&format!("/api/2.0/machines/{}/", urlencoding::encode(system_id)))
            .await
    }

    /// List all VM hosts known to MAAS
    pub async fn list_vm_hosts(&self) -> Result<Vec<VmHost>, MaasError> {
        debug!("Listing VM hosts");
        self.http.get("/api/2.0/pods/").await
    }

    /// Get a VM host by ID
    pub async fn get_vm_host(&self, id: u64) -> Result<VmHost, MaasError> {
        debug!("Fetching VM host {} from MAAS", id);
        self.http.get(&format!("/api/2.0/pods/{}/", id)).await
    }

    /// Register a new LXD VM host
    ///
    /// MAAS connects to `power_address` during this call and, when a password
    /// is supplied, uses it to add its certificate to the LXD trust store.
    pub async fn create_vm_host(&self, request: &VmHostCreateRequest) -> Result<VmHost, MaasError> {
        if request.name.is_empty() || request.power_address.is_empty() {
            return Err(MaasError::InvalidRequest(
                "VM host name and power_address are required".to_string(),
            ));
        }
        debug!("Creating VM host {} at {}", request.name, request.power_address);
        self.http.post_form("/api/2.0/pods/", &request.form_fields()).await
    }

    /// Update zone, pool or project of an existing VM host
    pub async fn update_vm_host(&self, id: u64, request: &VmHostUpdateRequest) -> Result<VmHost, MaasError> {
        if request.is_empty() {
            return self.get_vm_host(id).await;
        }
        debug!("Updating VM host {}: {:?}", id, request);
        self.http
            .put_form(&format!("/api/2.0/pods/{}/", id), &request.form_fields())
            .await
    }
}

#[async_trait::async_trait]
impl MaasClientTrait for MaasClient {
    fn base_url(&self) -> &str {
        self.base_url()
    }

    async fn get_machine(&self, system_id: &str) -> Result<Machine, MaasError> {
        self.get_machine(system_id).await
    }

    async fn list_vm_hosts(&self) -> Result<Vec<VmHost>, MaasError> {
        self.list_vm_hosts().await
    }

    async fn get_vm_host(&self, id: u64) -> Result<VmHost, MaasError> {
        self.get_vm_host(id).await
    }

    async fn create_vm_host(&self, request: &VmHostCreateRequest) -> Result<VmHost, MaasError> {
        self.create_vm_host(request).await
    }

    async fn update_vm_host(&self, id: u64, request: &VmHostUpdateRequest) -> Result<VmHost, MaasError> {
        self.update_vm_host(id, request).await
    }
}
