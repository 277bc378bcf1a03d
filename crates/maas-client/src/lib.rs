//! MAAS REST API Client
//!
//! A Rust client library for the parts of the MAAS 2.0 REST API a hypervisor
//! node needs: looking up its own machine record and registering itself as a
//! VM host (a "pod" in MAAS terms).
//!
//! # Example
//!
//! ```no_run
//! use maas_client::{MaasClient, MaasClientTrait, VmHostCreateRequest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = MaasClient::new(
//!     "http://maas:5240/MAAS".to_string(),
//!     "consumer:token:secret",
//! )?;
//!
//! // Look up the machine this node was deployed as
//! let machine = client.get_machine("abc123").await?;
//! println!("zone = {:?}", machine.zone_name());
//!
//! // Register the local LXD daemon
//! let request = VmHostCreateRequest {
//!     name: "node-01".to_string(),
//!     power_address: "10.0.0.5:8443".to_string(),
//!     password: Some("trust".to_string()),
//!     zone: Some("z1".to_string()),
//!     pool: Some("p1".to_string()),
//!     project: Some("maas".to_string()),
//! };
//! let vm_host = client.create_vm_host(&request).await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod common;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod maas_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use auth::MaasApiKey;
pub use client::MaasClient;
pub use common::HttpClient;
pub use error::MaasError;
pub use models::*;
pub use maas_trait::MaasClientTrait;
#[cfg(feature = "test-util")]
pub use mock::MockMaasClient;
