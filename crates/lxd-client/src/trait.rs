//! LxdClient trait for mocking
//!
//! The concrete LxdClient implements this trait, and tests can use the
//! in-memory mock behind the `test-util` feature.

use crate::error::LxdError;
use crate::models::*;

/// Trait for LXD control API operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait LxdClientTrait: Send + Sync {
    /// `GET /1.0`
    async fn server_info(&self) -> Result<ServerInfo, LxdError>;

    // Storage
    async fn list_storage_pools(&self) -> Result<Vec<StoragePool>, LxdError>;
    async fn get_storage_pool(&self, name: &str) -> Result<StoragePool, LxdError>;
    async fn create_storage_pool(&self, pool: &StoragePoolsPost) -> Result<(), LxdError>;
    async fn update_storage_pool(&self, name: &str, patch: &ConfigPatch) -> Result<(), LxdError>;

    // Networks
    async fn list_networks(&self) -> Result<Vec<Network>, LxdError>;
    async fn get_network(&self, name: &str) -> Result<Network, LxdError>;
    async fn create_network(&self, network: &NetworksPost) -> Result<(), LxdError>;
    async fn update_network(&self, name: &str, patch: &ConfigPatch) -> Result<(), LxdError>;

    // Profiles
    async fn list_profiles(&self) -> Result<Vec<String>, LxdError>;
    async fn create_profile(&self, profile: &ProfilesPost) -> Result<(), LxdError>;

    // Projects
    async fn list_projects(&self) -> Result<Vec<String>, LxdError>;
    async fn create_project(&self, project: &ProjectsPost) -> Result<(), LxdError>;
}
