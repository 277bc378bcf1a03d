//! Applying hypervisor configuration changes
//!
//! Server config keys and daemon restarts are applied by running commands.
//! Depending on how the node agent is deployed, those commands work either in
//! the agent's own namespaces or only from the host's namespaces. Both paths
//! are [`ConfigApplier`] strategies; [`ProbingApplier`] tries them in order and
//! remembers the first one that worked.

use crate::error::LxdError;
use crate::exec::{CommandRunner, Invocation};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// A change to the hypervisor's server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigChange {
    /// `lxc config set <key> <value>`
    SetServerConfig { key: String, value: String },
    /// Restart the daemon so listener changes take effect
    RestartDaemon,
}

impl ConfigChange {
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        ConfigChange::SetServerConfig {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Description safe for logs (values of secret keys are hidden)
    pub fn describe(&self) -> String {
        match self {
            ConfigChange::SetServerConfig { key, .. } if key.contains("password") => {
                format!("set {} = <redacted>", key)
            }
            ConfigChange::SetServerConfig { key, value } => format!("set {} = {}", key, value),
            ConfigChange::RestartDaemon => "restart daemon".to_string(),
        }
    }
}

/// Capability: apply one hypervisor configuration change
#[async_trait::async_trait]
pub trait ConfigApplier: Send + Sync + std::fmt::Debug {
    /// Short strategy name for logs
    fn name(&self) -> &str;

    async fn apply(&self, change: &ConfigChange) -> Result<(), LxdError>;
}

/// Applies changes by running `lxc` / `snap` / `systemctl` through a runner
#[derive(Debug, Clone)]
pub struct ExecApplier {
    name: String,
    runner: Arc<dyn CommandRunner>,
    lxd_dir: PathBuf,
}

impl ExecApplier {
    pub fn new(name: impl Into<String>, runner: Arc<dyn CommandRunner>, lxd_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            runner,
            lxd_dir: lxd_dir.into(),
        }
    }

    fn is_snap(&self) -> bool {
        self.lxd_dir.starts_with("/var/snap")
    }

    /// Command that applies `change`
    pub fn invocation(&self, change: &ConfigChange) -> Invocation {
        match change {
            ConfigChange::SetServerConfig { key, value } => Invocation::new("lxc")
                .args(["config", "set", key.as_str(), value.as_str()])
                .env("LXD_DIR", self.lxd_dir.to_string_lossy()),
            ConfigChange::RestartDaemon if self.is_snap() => {
                Invocation::new("snap").args(["restart", "lxd"])
            }
            ConfigChange::RestartDaemon => Invocation::new("systemctl").args(["restart", "lxd"]),
        }
    }
}

#[async_trait::async_trait]
impl ConfigApplier for ExecApplier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, change: &ConfigChange) -> Result<(), LxdError> {
        debug!("[{}] {}", self.name, change.describe());
        self.runner.run(&self.invocation(change)).await.map(|_| ())
    }
}

/// Tries each strategy in order, remembering the first that succeeds
#[derive(Debug)]
pub struct ProbingApplier {
    strategies: Vec<Arc<dyn ConfigApplier>>,
    preferred: Mutex<Option<usize>>,
}

impl ProbingApplier {
    pub fn new(strategies: Vec<Arc<dyn ConfigApplier>>) -> Self {
        Self {
            strategies,
            preferred: Mutex::new(None),
        }
    }

    /// Name of the strategy that last succeeded, if any
    pub fn selected(&self) -> Option<String> {
        let preferred = *self.preferred.lock().unwrap_or_else(|e| e.into_inner());
        preferred.map(|i| self.strategies[i].name().to_string())
    }

    fn order(&self) -> Vec<usize> {
        let preferred = *self.preferred.lock().unwrap_or_else(|e| e.into_inner());
        let mut order: Vec<usize> = (0..self.strategies.len()).collect();
        if let Some(p) = preferred {
            order.retain(|&i| i != p);
            order.insert(0, p);
        }
        order
    }
}

#[async_trait::async_trait]
impl ConfigApplier for ProbingApplier {
    fn name(&self) -> &str {
        "probing"
    }

    async fn apply(&self, change: &ConfigChange) -> Result<(), LxdError> {
        let mut last_error = None;
        for index in self.order() {
            let strategy = &self.strategies[index];
            match strategy.apply(change).await {
                Ok(()) => {
                    let mut preferred = self.preferred.lock().unwrap_or_else(|e| e.into_inner());
                    if *preferred != Some(index) {
                        info!("Using '{}' strategy for hypervisor configuration changes", strategy.name());
                        *preferred = Some(index);
                    }
                    return Ok(());
                }
                Err(e) => {
                    warn!("'{}' strategy failed to {}: {}", strategy.name(), change.describe(), e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| LxdError::Exec("no configuration strategies available".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Scripted {
        name: &'static str,
        succeed: bool,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(name: &'static str, succeed: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                succeed,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl ConfigApplier for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        async fn apply(&self, _change: &ConfigChange) -> Result<(), LxdError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                Ok(())
            } else {
                Err(LxdError::Exec(format!("{} failed", self.name)))
            }
        }
    }

    #[tokio::test]
    async fn test_falls_back_and_remembers() {
        let direct = Scripted::new("direct", false);
        let host = Scripted::new("host-namespace", true);
        let strategies: Vec<Arc<dyn ConfigApplier>> = vec![direct.clone(), host.clone()];
        let applier = ProbingApplier::new(strategies);

        applier.apply(&ConfigChange::set("core.https_address", "10.0.0.5:8443")).await.unwrap();
        assert_eq!(applier.selected().as_deref(), Some("host-namespace"));
        assert_eq!(direct.calls.load(Ordering::SeqCst), 1);

        // Second change goes straight to the remembered strategy
        applier.apply(&ConfigChange::RestartDaemon).await.unwrap();
        assert_eq!(direct.calls.load(Ordering::SeqCst), 1);
        assert_eq!(host.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_all_strategies_failing_returns_last_error() {
        let strategies: Vec<Arc<dyn ConfigApplier>> = vec![
            Scripted::new("direct", false),
            Scripted::new("host-namespace", false),
        ];
        let applier = ProbingApplier::new(strategies);
        let err = applier.apply(&ConfigChange::RestartDaemon).await.unwrap_err();
        assert!(err.to_string().contains("host-namespace failed"));
        assert_eq!(applier.selected(), None);
    }

    #[test]
    fn test_describe_redacts_passwords() {
        let change = ConfigChange::set("core.trust_password", "hunter2");
        assert!(!change.describe().contains("hunter2"));
    }

    #[derive(Debug)]
    struct NoopRunner;

    #[async_trait::async_trait]
    impl CommandRunner for NoopRunner {
        async fn run(&self, _invocation: &Invocation) -> Result<String, LxdError> {
            Ok(String::new())
        }
    }

    #[test]
    fn test_restart_command_follows_install_flavour() {
        let snap = ExecApplier::new("direct", Arc::new(NoopRunner), "/var/snap/lxd/common/lxd");
        assert_eq!(snap.invocation(&ConfigChange::RestartDaemon).program, "snap");

        let deb = ExecApplier::new("direct", Arc::new(NoopRunner), "/var/lib/lxd");
        let inv = deb.invocation(&ConfigChange::RestartDaemon);
        assert_eq!(inv.program, "systemctl");
        assert_eq!(inv.args, vec!["restart", "lxd"]);
    }
}
