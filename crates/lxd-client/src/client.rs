//! LXD API client
//!
//! Issues raw REST requests with `lxc query` against the daemon selected by
//! `LXD_DIR`. `lxc query` prints the `metadata` of a synchronous response and,
//! with `--wait`, the final metadata of an asynchronous operation.

use crate::error::LxdError;
use crate::exec::{CommandRunner, Invocation};
use crate::lxd_trait::LxdClientTrait;
use crate::models::*;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// LXD API client bound to one daemon socket directory
#[derive(Debug, Clone)]
pub struct LxdClient {
    runner: Arc<dyn CommandRunner>,
    lxd_dir: PathBuf,
}

impl LxdClient {
    /// Create a client for the daemon whose `unix.socket` lives in `lxd_dir`
    pub fn new(runner: Arc<dyn CommandRunner>, lxd_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            lxd_dir: lxd_dir.into(),
        }
    }

    /// Create a client from the socket path itself
    pub fn for_socket(runner: Arc<dyn CommandRunner>, socket: &Path) -> Self {
        let dir = socket.parent().map_or_else(|| PathBuf::from("/"), Path::to_path_buf);
        Self::new(runner, dir)
    }

    pub fn lxd_dir(&self) -> &Path {
        &self.lxd_dir
    }

    fn query(&self, method: &str, path: &str, body: Option<String>) -> Invocation {
        let mut inv = Invocation::new("lxc")
            .arg("query")
            .env("LXD_DIR", self.lxd_dir.to_string_lossy());
        if method != "GET" {
            inv = inv.args(["--wait", "--request", method]);
        }
        if let Some(body) = body {
            inv = inv.args(["--data".to_string(), body]);
        }
        inv.arg(path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, LxdError> {
        debug!("LXD GET {}", path);
        let out = self.runner.run(&self.query("GET", path, None)).await?;
        serde_json::from_str(out.trim()).map_err(|e| {
            LxdError::Api(format!(
                "error decoding {} response: {} - Response (first 500 chars): {}",
                path,
                e,
                out.chars().take(500).collect::<String>()
            ))
        })
    }

    async fn send<B: Serialize + ?Sized>(&self, method: &str, path: &str, body: &B) -> Result<(), LxdError> {
        let body = serde_json::to_string(body)?;
        debug!("LXD {} {}", method, path);
        self.runner.run(&self.query(method, path, Some(body))).await?;
        Ok(())
    }

    /// List the names of objects under a collection endpoint
    async fn list_names(&self, path: &str) -> Result<Vec<String>, LxdError> {
        let urls: Vec<String> = self.get(path).await?;
        Ok(urls.iter().map(|u| name_from_url(u).to_string()).collect())
    }
}

fn encode_name(name: &str) -> Result<&str, LxdError> {
    if name.is_empty() || name.contains('/') || name.contains('?') {
        return Err(LxdError::Api(format!("invalid object name {:?}", name)));
    }
    Ok(name)
}

#[async_trait::async_trait]
impl LxdClientTrait for LxdClient {
    async fn server_info(&self) -> Result<ServerInfo, LxdError> {
        self.get("/1.0").await
    }

    async fn list_storage_pools(&self) -> Result<Vec<StoragePool>, LxdError> {
        self.get("/1.0/storage-pools?recursion=1").await
    }

    async fn get_storage_pool(&self, name: &str) -> Result<StoragePool, LxdError> {
        self.get(&format!("/1.0/storage-pools/{}", encode_name(name)?)).await
    }

    async fn create_storage_pool(&self, pool: &StoragePoolsPost) -> Result<(), LxdError> {
        self.send("POST", "/1.0/storage-pools", pool).await
    }

    async fn update_storage_pool(&self, name: &str, patch: &ConfigPatch) -> Result<(), LxdError> {
        self.send("PATCH", &format!("/1.0/storage-pools/{}", encode_name(name)?), patch)
            .await
    }

    async fn list_networks(&self) -> Result<Vec<Network>, LxdError> {
        self.get("/1.0/networks?recursion=1").await
    }

    async fn get_network(&self, name: &str) -> Result<Network, LxdError> {
        self.get(&format!("/1.0/networks/{}", encode_name(name)?)).await
    }

    async fn create_network(&self, network: &NetworksPost) -> Result<(), LxdError> {
        self.send("POST", "/1.0/networks", network).await
    }

    async fn update_network(&self, name: &str, patch: &ConfigPatch) -> Result<(), LxdError> {
        self.send("PATCH", &format!("/1.0/networks/{}", encode_name(name)?), patch)
            .await
    }

    async fn list_profiles(&self) -> Result<Vec<String>, LxdError> {
        self.list_names("/1.0/profiles").await
    }

    async fn create_profile(&self, profile: &ProfilesPost) -> Result<(), LxdError> {
        self.send("POST", "/1.0/profiles", profile).await
    }

    async fn list_projects(&self) -> Result<Vec<String>, LxdError> {
        self.list_names("/1.0/projects").await
    }

    async fn create_project(&self, project: &ProjectsPost) -> Result<(), LxdError> {
        self.send("POST", "/1.0/projects", project).await
    }
}
