//! MaasClient trait for mocking
//!
//! This trait abstracts the MaasClient to enable mocking in unit tests.
//! The concrete MaasClient implements this trait, and tests can use mock implementations.

use crate::error::MaasError;
use crate::models::*;

/// Trait for MAAS API client operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait MaasClientTrait: Send + Sync {
    /// Get the base URL
    fn base_url(&self) -> &str;

    // Machine Operations
    async fn get_machine(&self, system_id: &str) -> Result<Machine, MaasError>;

    // VM Host (pod) Operations
    async fn list_vm_hosts(&self) -> Result<Vec<VmHost>, MaasError>;
    async fn get_vm_host(&self, id: u64) -> Result<VmHost, MaasError>;
    async fn create_vm_host(&self, request: &VmHostCreateRequest) -> Result<VmHost, MaasError>;
    async fn update_vm_host(&self, id: u64, request: &VmHostUpdateRequest) -> Result<VmHost, MaasError>;
}
