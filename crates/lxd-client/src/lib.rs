//! LXD Control API Client
//!
//! Client for the LXD REST API exposed on the daemon's local unix socket.
//! Requests are issued through `lxc query`, which speaks the raw REST API over
//! the socket selected by `LXD_DIR`, so no HTTP-over-unix-socket stack is
//! needed in-process.
//!
//! Configuration changes that must sometimes be applied from the host mount
//! namespace (server config keys, daemon restart) go through the
//! [`ConfigApplier`] capability instead of the REST client.

pub mod applier;
pub mod client;
pub mod error;
pub mod exec;
pub mod models;
#[path = "trait.rs"]
pub mod lxd_trait;
pub mod units;
#[cfg(feature = "test-util")]
pub mod mock;

pub use applier::{ConfigApplier, ConfigChange, ExecApplier, ProbingApplier};
pub use client::LxdClient;
pub use error::LxdError;
pub use exec::{CommandRunner, HostNamespaceRunner, Invocation, LocalRunner};
pub use lxd_trait::LxdClientTrait;
pub use models::*;
#[cfg(feature = "test-util")]
pub use mock::{MockConfigApplier, MockLxdClient};
