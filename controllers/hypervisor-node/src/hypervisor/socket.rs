//! Waiting for the LXD control socket

use crate::config::SocketSettings;
use crate::error::ControllerError;
use lxd_client::{CommandRunner, Invocation, LxdClientTrait};
use std::path::{Path, PathBuf};
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};

/// First candidate socket that exists
pub fn first_existing(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find(|candidate| candidate.exists()).cloned()
}

/// Poll the candidate sockets until one exists or the timeout elapses
pub async fn wait_for_socket(settings: &SocketSettings) -> Result<PathBuf, ControllerError> {
    let started = Instant::now();
    loop {
        if let Some(socket) = first_existing(&settings.candidates) {
            info!("LXD control socket found at {}", socket.display());
            return Ok(socket);
        }
        if started.elapsed() >= settings.timeout {
            return Err(ControllerError::SocketTimeout(format!(
                "none of {} appeared within {:?}",
                settings
                    .candidates
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
                settings.timeout
            )));
        }
        debug!("Waiting for LXD control socket");
        sleep(settings.poll_interval).await;
    }
}

/// Read-only state dump for operators when the socket never appears
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub sockets: Vec<(PathBuf, bool)>,
    pub daemon_status: String,
    pub processes: String,
}

impl Diagnostics {
    /// Gather the dump. Commands that fail contribute their error text.
    pub async fn collect(candidates: &[PathBuf], runner: &dyn CommandRunner) -> Self {
        let sockets = candidates
            .iter()
            .map(|candidate| (candidate.clone(), candidate.exists()))
            .collect();

        let daemon_status = capture(
            runner,
            Invocation::new("systemctl").args(["status", "--no-pager", "snap.lxd.daemon", "lxd"]),
        )
        .await;
        let processes = capture(runner, Invocation::new("ps").args(["-eo", "pid,user,args"]))
            .await
            .lines()
            .filter(|line| line.contains("lxd") || line.starts_with("  PID") || line.starts_with("PID"))
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            sockets,
            daemon_status,
            processes,
        }
    }

    /// Emit the dump at error level
    pub fn log(&self) {
        error!("LXD control socket diagnostics:");
        for (path, exists) in &self.sockets {
            error!("  {}: {}", path.display(), if *exists { "present" } else { "missing" });
        }
        error!("  daemon status:\n{}", self.daemon_status);
        error!("  lxd processes:\n{}", self.processes);
    }
}

async fn capture(runner: &dyn CommandRunner, invocation: Invocation) -> String {
    match runner.run(&invocation).await {
        Ok(out) => out.trim_end().to_string(),
        Err(e) => format!("<{} failed: {}>", invocation.describe(), e),
    }
}

/// Wait for the socket; on timeout log diagnostics and return the timeout error
pub async fn wait_or_diagnose(
    settings: &SocketSettings,
    runner: &dyn CommandRunner,
) -> Result<PathBuf, ControllerError> {
    match wait_for_socket(settings).await {
        Ok(socket) => Ok(socket),
        Err(e) => {
            Diagnostics::collect(&settings.candidates, runner).await.log();
            Err(e)
        }
    }
}

/// Poll the daemon API until it answers or the socket timeout elapses
///
/// After a restart the socket file can exist before the daemon serves
/// requests on it. On timeout the diagnostics are logged.
pub async fn wait_for_daemon(
    settings: &SocketSettings,
    lxd: &dyn LxdClientTrait,
    runner: &dyn CommandRunner,
) -> Result<(), ControllerError> {
    let started = Instant::now();
    loop {
        let last_error = match lxd.server_info().await {
            Ok(info) => {
                info!("LXD daemon {} answering", info.environment.server_version);
                return Ok(());
            }
            Err(e) => e,
        };
        if started.elapsed() >= settings.timeout {
            warn!("LXD daemon still not answering: {}", last_error);
            Diagnostics::collect(&settings.candidates, runner).await.log();
            return Err(ControllerError::SocketTimeout(format!(
                "daemon did not answer within {:?}: {}",
                settings.timeout, last_error
            )));
        }
        debug!("Waiting for LXD daemon: {}", last_error);
        sleep(settings.poll_interval).await;
    }
}

/// `LXD_DIR` for a socket path
pub fn lxd_dir(socket: &Path) -> PathBuf {
    socket.parent().map_or_else(|| PathBuf::from("/"), Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::StaticRunner;
    use lxd_client::MockLxdClient;
    use std::time::Duration;

    fn settings(candidates: Vec<PathBuf>) -> SocketSettings {
        SocketSettings {
            candidates,
            timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_first_candidate_that_exists_wins() {
        let dir = tempfile::tempdir().unwrap();
        let snap = dir.path().join("snap/unix.socket");
        let deb = dir.path().join("deb/unix.socket");
        std::fs::create_dir_all(deb.parent().unwrap()).unwrap();
        std::fs::write(&deb, b"").unwrap();

        let found = wait_for_socket(&settings(vec![snap, deb.clone()])).await.unwrap();
        assert_eq!(found, deb);
        assert_eq!(lxd_dir(&found), dir.path().join("deb"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_daemon_wait_polls_until_the_api_answers() {
        let lxd = MockLxdClient::new();
        lxd.fail_next_server_info(3);
        let runner = StaticRunner::new("");
        let started = Instant::now();

        wait_for_daemon(&settings(Vec::new()), &lxd, &runner).await.unwrap();
        assert_eq!(lxd.call_count("server_info"), 4);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_daemon_wait_times_out_while_the_api_is_down() {
        let lxd = MockLxdClient::new();
        lxd.set_unreachable(true);
        let runner = StaticRunner::new("");

        let err = wait_for_daemon(&settings(Vec::new()), &lxd, &runner)
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::SocketTimeout(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_and_collects_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("unix.socket");
        let runner = StaticRunner::new("1 root /snap/lxd/current/bin/lxd --logfile\n2 root sshd");

        let err = wait_or_diagnose(&settings(vec![missing.clone()]), &runner)
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::SocketTimeout(_)));

        let diagnostics = Diagnostics::collect(&[missing.clone()], &runner).await;
        assert_eq!(diagnostics.sockets, vec![(missing, false)]);
        assert!(diagnostics.processes.contains("lxd"));
        assert!(!diagnostics.processes.contains("sshd"));
    }
}
