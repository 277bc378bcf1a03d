//! EnsureStoragePool
//!
//! Creates the pool when missing, otherwise corrects only its size. The driver
//! of an existing pool is never touched and pools are never deleted.

use crate::error::ControllerError;
use crate::report::{WarningKind, Warnings};
use lxd_client::units::{GIB, format_gib, parse_size};
use lxd_client::{ConfigPatch, LxdClientTrait, LxdError, StoragePoolsPost};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Name of the pool VMs are placed on
pub const POOL_NAME: &str = "default";

/// Desired storage pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePoolSpec {
    pub name: String,
    pub driver: String,
    pub size_gib: u64,
}

impl StoragePoolSpec {
    pub fn new(driver: impl Into<String>, size_gib: u64) -> Self {
        Self {
            name: POOL_NAME.to_string(),
            driver: driver.into(),
            size_gib,
        }
    }

    pub fn size(&self) -> String {
        format_gib(self.size_gib)
    }

    fn to_post(&self) -> StoragePoolsPost {
        let mut config = BTreeMap::new();
        config.insert("size".to_string(), self.size());
        StoragePoolsPost {
            name: self.name.clone(),
            driver: self.driver.clone(),
            config,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageOutcome {
    Created,
    Resized { from: String, to: String },
    /// A resize was needed but LXD rejected it
    ResizeFailed,
    Unchanged,
}

/// Converge the storage pool
pub async fn ensure_storage_pool(
    lxd: &dyn LxdClientTrait,
    spec: &StoragePoolSpec,
    warnings: &mut Warnings,
) -> Result<StorageOutcome, ControllerError> {
    let pool = match lxd.get_storage_pool(&spec.name).await {
        Ok(pool) => pool,
        Err(LxdError::NotFound(_)) => {
            info!(
                "Creating storage pool {} ({}, {})",
                spec.name,
                spec.driver,
                spec.size()
            );
            lxd.create_storage_pool(&spec.to_post()).await?;
            return Ok(StorageOutcome::Created);
        }
        Err(e) => return Err(e.into()),
    };

    if pool.driver != spec.driver {
        debug!(
            "Storage pool {} uses driver {}, keeping it (configured: {})",
            pool.name, pool.driver, spec.driver
        );
    }

    let Some(current) = pool.size() else {
        debug!(
            "Storage pool {} has no size key, desired size {} not compared",
            pool.name,
            spec.size()
        );
        return Ok(StorageOutcome::Unchanged);
    };
    let desired_bytes = spec.size_gib * GIB;
    if parse_size(current) == Some(desired_bytes) {
        debug!("Storage pool {} already {}", pool.name, current);
        return Ok(StorageOutcome::Unchanged);
    }

    let from = current.to_string();
    let to = spec.size();
    info!("Resizing storage pool {} from {} to {}", pool.name, from, to);
    match lxd
        .update_storage_pool(&spec.name, &ConfigPatch::single("size", to.clone()))
        .await
    {
        Ok(()) => Ok(StorageOutcome::Resized { from, to }),
        Err(e) => {
            warnings.push(
                WarningKind::Configuration,
                format!("failed to resize storage pool {} to {}: {}", spec.name, to, e),
            );
            Ok(StorageOutcome::ResizeFailed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lxd_client::{MockLxdClient, StoragePool};

    fn existing_pool(driver: &str, size: &str) -> StoragePool {
        StoragePool {
            name: POOL_NAME.to_string(),
            driver: driver.to_string(),
            config: BTreeMap::from([("size".to_string(), size.to_string())]),
            status: "Created".to_string(),
        }
    }

    #[tokio::test]
    async fn test_creates_missing_pool() {
        let lxd = MockLxdClient::new();
        let mut warnings = Warnings::default();

        let outcome = ensure_storage_pool(&lxd, &StoragePoolSpec::new("zfs", 80), &mut warnings)
            .await
            .unwrap();
        assert_eq!(outcome, StorageOutcome::Created);
        let pool = lxd.storage_pool(POOL_NAME).unwrap();
        assert_eq!(pool.driver, "zfs");
        assert_eq!(pool.size(), Some("80GiB"));
    }

    #[tokio::test]
    async fn test_size_drift_is_corrected_once() {
        let lxd = MockLxdClient::new();
        lxd.add_storage_pool(existing_pool("zfs", "40GB"));
        let mut warnings = Warnings::default();

        let outcome = ensure_storage_pool(&lxd, &StoragePoolSpec::new("zfs", 45), &mut warnings)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            StorageOutcome::Resized {
                from: "40GB".to_string(),
                to: "45GiB".to_string()
            }
        );
        assert_eq!(
            lxd.calls_to("update_storage_pool"),
            vec![r#"update_storage_pool default {"size":"45GiB"}"#.to_string()]
        );

        // Converged: a second pass makes no update
        ensure_storage_pool(&lxd, &StoragePoolSpec::new("zfs", 45), &mut warnings)
            .await
            .unwrap();
        assert_eq!(lxd.call_count("update_storage_pool"), 1);
    }

    #[tokio::test]
    async fn test_equal_size_makes_no_update() {
        let lxd = MockLxdClient::new();
        lxd.add_storage_pool(existing_pool("zfs", "45GiB"));
        let mut warnings = Warnings::default();

        let outcome = ensure_storage_pool(&lxd, &StoragePoolSpec::new("zfs", 45), &mut warnings)
            .await
            .unwrap();
        assert_eq!(outcome, StorageOutcome::Unchanged);
        assert_eq!(lxd.call_count("update_storage_pool"), 0);
    }

    #[tokio::test]
    async fn test_pool_without_size_key_is_left_alone() {
        let lxd = MockLxdClient::new();
        let mut pool = existing_pool("dir", "");
        pool.config.clear();
        lxd.add_storage_pool(pool);
        let mut warnings = Warnings::default();

        let outcome = ensure_storage_pool(&lxd, &StoragePoolSpec::new("zfs", 80), &mut warnings)
            .await
            .unwrap();
        assert_eq!(outcome, StorageOutcome::Unchanged);
        assert_eq!(lxd.call_count("update_storage_pool"), 0);
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn test_driver_of_existing_pool_is_kept() {
        let lxd = MockLxdClient::new();
        lxd.add_storage_pool(existing_pool("btrfs", "80GiB"));
        let mut warnings = Warnings::default();

        ensure_storage_pool(&lxd, &StoragePoolSpec::new("zfs", 80), &mut warnings)
            .await
            .unwrap();
        assert_eq!(lxd.storage_pool(POOL_NAME).unwrap().driver, "btrfs");
        assert_eq!(lxd.call_count("create_storage_pool"), 0);
    }

    #[tokio::test]
    async fn test_failed_resize_is_a_warning() {
        let lxd = MockLxdClient::new();
        lxd.add_storage_pool(existing_pool("zfs", "40GB"));
        lxd.set_fail_updates(true);
        let mut warnings = Warnings::default();

        let outcome = ensure_storage_pool(&lxd, &StoragePoolSpec::new("zfs", 45), &mut warnings)
            .await
            .unwrap();
        assert_eq!(outcome, StorageOutcome::ResizeFailed);
        assert_eq!(warnings.count(WarningKind::Configuration), 1);
    }

    #[tokio::test]
    async fn test_unreachable_hypervisor_is_fatal() {
        let lxd = MockLxdClient::new();
        lxd.set_unreachable(true);
        let mut warnings = Warnings::default();

        let result = ensure_storage_pool(&lxd, &StoragePoolSpec::new("zfs", 45), &mut warnings).await;
        assert!(matches!(result, Err(ControllerError::Lxd(_))));
        assert_eq!(lxd.call_count("create_storage_pool"), 0);
    }
}
