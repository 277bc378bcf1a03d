//! Node record access and the completion signal
//!
//! The completion label on the Kubernetes Node is the only durable success
//! indicator. Writing it is idempotent; failing to write it is a warning since
//! the provisioning work it announces is already done.

use crate::error::ControllerError;
use crate::report::{WarningKind, Warnings};
use k8s_openapi::api::core::v1::Node;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use std::collections::BTreeMap;
use tracing::info;

/// Label marking a node whose hypervisor is provisioned and registered
pub const COMPLETION_LABEL: &str = "dcops.microscaler.io/hypervisor-ready";
pub const COMPLETION_VALUE: &str = "true";

/// The parts of a Node the controller reads
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeRecord {
    pub name: String,
    pub provider_id: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub internal_ip: Option<String>,
}

impl NodeRecord {
    pub fn from_node(node: &Node) -> Self {
        let internal_ip = node
            .status
            .as_ref()
            .and_then(|s| s.addresses.as_ref())
            .and_then(|addresses| {
                addresses
                    .iter()
                    .find(|a| a.type_ == "InternalIP")
                    .map(|a| a.address.clone())
            });
        Self {
            name: node.metadata.name.clone().unwrap_or_default(),
            provider_id: node.spec.as_ref().and_then(|s| s.provider_id.clone()),
            labels: node.metadata.labels.clone().unwrap_or_default(),
            internal_ip,
        }
    }

    /// Whether the completion label is already present
    pub fn is_provisioned(&self) -> bool {
        self.labels.get(COMPLETION_LABEL).map(String::as_str) == Some(COMPLETION_VALUE)
    }
}

/// Read and label Node records
#[async_trait::async_trait]
pub trait NodeStore: Send + Sync {
    async fn get_node(&self, name: &str) -> Result<NodeRecord, ControllerError>;

    async fn set_label(&self, name: &str, key: &str, value: &str) -> Result<(), ControllerError>;
}

/// `NodeStore` backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeNodeStore {
    api: Api<Node>,
}

impl std::fmt::Debug for KubeNodeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeNodeStore").finish_non_exhaustive()
    }
}

impl KubeNodeStore {
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait::async_trait]
impl NodeStore for KubeNodeStore {
    async fn get_node(&self, name: &str) -> Result<NodeRecord, ControllerError> {
        let node = self.api.get(name).await?;
        Ok(NodeRecord::from_node(&node))
    }

    async fn set_label(&self, name: &str, key: &str, value: &str) -> Result<(), ControllerError> {
        let patch = label_patch(key, value);
        let pp = PatchParams::default();
        self.api.patch(name, &pp, &Patch::Merge(&patch)).await?;
        Ok(())
    }
}

/// JSON merge patch setting a single label
pub fn label_patch(key: &str, value: &str) -> serde_json::Value {
    serde_json::json!({
        "metadata": {
            "labels": {
                key: value
            }
        }
    })
}

/// Publishes the completion label
pub struct CompletionPublisher<'a> {
    nodes: &'a dyn NodeStore,
}

impl<'a> CompletionPublisher<'a> {
    pub fn new(nodes: &'a dyn NodeStore) -> Self {
        Self { nodes }
    }

    /// Write the completion label. Returns whether it was written.
    pub async fn publish(&self, node_name: &str, warnings: &mut Warnings) -> bool {
        match self
            .nodes
            .set_label(node_name, COMPLETION_LABEL, COMPLETION_VALUE)
            .await
        {
            Ok(()) => {
                info!("Labelled node {} {}={}", node_name, COMPLETION_LABEL, COMPLETION_VALUE);
                true
            }
            Err(e) => {
                warnings.push(
                    WarningKind::SignalPublish,
                    format!("failed to label node {}: {}", node_name, e),
                );
                false
            }
        }
    }
}
