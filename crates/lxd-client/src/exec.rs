//! Command execution
//!
//! Every interaction with the daemon is a short-lived command. `LocalRunner`
//! runs it in the process's own namespaces; `HostNamespaceRunner` re-executes
//! it inside the host's namespaces through `nsenter`, which is what a
//! privileged DaemonSet pod needs when the snap-installed `lxc` binary and
//! socket only exist on the host.

use crate::error::LxdError;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Default bound on a single command
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// One command to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    fn with_env(mut self, env: &[(String, String)]) -> Self {
        self.env.extend(env.iter().cloned());
        self
    }

    /// Human readable form for logs
    pub fn describe(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Something that can run an [`Invocation`] and return its stdout
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync + std::fmt::Debug {
    async fn run(&self, invocation: &Invocation) -> Result<String, LxdError>;
}

/// Runs commands in the current process namespaces
#[derive(Debug, Clone)]
pub struct LocalRunner {
    timeout: Duration,
}

impl Default for LocalRunner {
    fn default() -> Self {
        Self {
            timeout: COMMAND_TIMEOUT,
        }
    }
}

impl LocalRunner {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait::async_trait]
impl CommandRunner for LocalRunner {
    async fn run(&self, invocation: &Invocation) -> Result<String, LxdError> {
        let description = invocation.describe();
        debug!("Running: {}", description);

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        for (key, value) in &invocation.env {
            cmd.env(key, value);
        }
        cmd.kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_elapsed| {
                warn!("{} timed out after {:?}", invocation.program, self.timeout);
                LxdError::Timeout(format!("{} after {:?}", invocation.program, self.timeout))
            })?
            .map_err(|e| LxdError::Exec(format!("failed to execute {}: {}", invocation.program, e)))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(classify_failure(&invocation.program, output.status.code(), &stderr))
        }
    }
}

/// Runs commands inside the namespaces of the host's init process
#[derive(Debug, Clone, Default)]
pub struct HostNamespaceRunner {
    inner: LocalRunner,
}

impl HostNamespaceRunner {
    pub fn new(inner: LocalRunner) -> Self {
        Self { inner }
    }

    /// Wrap an invocation in `nsenter` targeting PID 1
    pub fn wrap(invocation: &Invocation) -> Invocation {
        Invocation::new("nsenter")
            .args(["--target", "1", "--mount", "--uts", "--ipc", "--net", "--pid", "--"])
            .arg(invocation.program.clone())
            .args(invocation.args.iter().cloned())
            .with_env(&invocation.env)
    }
}

#[async_trait::async_trait]
impl CommandRunner for HostNamespaceRunner {
    async fn run(&self, invocation: &Invocation) -> Result<String, LxdError> {
        self.inner.run(&Self::wrap(invocation)).await
    }
}

/// Map a failed `lxc` exit into the error taxonomy
pub(crate) fn classify_failure(program: &str, code: Option<i32>, stderr: &str) -> LxdError {
    let lowered = stderr.to_lowercase();
    if lowered.contains("not found") {
        LxdError::NotFound(stderr.to_string())
    } else if program == "lxc" || program.ends_with("/lxc") {
        LxdError::Api(stderr.to_string())
    } else {
        LxdError::Exec(format!(
            "{} exited with {}: {}",
            program,
            code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
            stderr
        ))
    }
}
