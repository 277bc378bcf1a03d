//! Post-pipeline idle phase
//!
//! The process stays resident for its supervisor. In daemon mode a background
//! task re-enforces the trust secret on a fixed cadence; refresh failures are
//! warnings and never stop the loop.

use crate::config::SocketSettings;
use crate::hypervisor::LxdConnector;
use crate::hypervisor::socket::first_existing;
use crate::report::{WarningKind, Warnings};
use crate::trust::TrustEnforcer;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at, sleep};
use tracing::{debug, info};

const KEEP_ALIVE_TICK: Duration = Duration::from_secs(3600);

/// Re-apply and verify the trust secret once. Returns whether it succeeded.
pub async fn refresh_trust_once(
    connector: &dyn LxdConnector,
    socket: &SocketSettings,
    secret: &str,
    warnings: &mut Warnings,
) -> bool {
    let Some(path) = first_existing(&socket.candidates) else {
        warnings.push(WarningKind::TrustRefresh, "no LXD control socket present");
        return false;
    };
    let session = connector.connect(&path);
    let enforcer = TrustEnforcer::new(session.lxd.as_ref(), session.applier.as_ref(), secret);
    match enforcer.enforce().await {
        Ok(()) => true,
        Err(e) => {
            warnings.push(WarningKind::TrustRefresh, format!("trust secret refresh failed: {}", e));
            false
        }
    }
}

/// Spawn the periodic trust refresh; the first refresh runs one period from now
pub fn spawn_trust_refresh(
    connector: Arc<dyn LxdConnector>,
    socket: SocketSettings,
    secret: String,
    period: Duration,
) -> JoinHandle<()> {
    info!("Refreshing trust secret every {:?}", period);
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        loop {
            ticker.tick().await;
            let mut warnings = Warnings::default();
            if refresh_trust_once(connector.as_ref(), &socket, &secret, &mut warnings).await {
                debug!("Trust secret refreshed");
            }
        }
    })
}

/// Sleep forever
pub async fn keep_alive() {
    info!("Provisioning finished, idling");
    loop {
        sleep(KEEP_ALIVE_TICK).await;
        debug!("Still alive");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestHost;
    use lxd_client::LxdClientTrait;

    #[tokio::test]
    async fn test_refresh_enforces_secret() {
        let host = TestHost::fresh();
        let mut warnings = Warnings::default();

        assert!(refresh_trust_once(&host.connector, &host.config.socket, "secret", &mut warnings).await);
        assert!(host.lxd.server_info().await.unwrap().trust_password_set());
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_failure_is_a_warning() {
        let host = TestHost::fresh();
        host.applier.set_fail_always(true);
        let mut warnings = Warnings::default();

        assert!(!refresh_trust_once(&host.connector, &host.config.socket, "secret", &mut warnings).await);
        assert_eq!(warnings.count(WarningKind::TrustRefresh), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_refresh_does_not_fire_immediately() {
        let host = TestHost::fresh();
        let period = Duration::from_secs(900);
        let handle = spawn_trust_refresh(
            Arc::new(host.connector.clone()),
            host.config.socket.clone(),
            "secret".to_string(),
            period,
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(host.applier.applied().is_empty());

        tokio::time::sleep(period).await;
        assert_eq!(host.applier.applied().len(), 1);

        tokio::time::sleep(period).await;
        assert_eq!(host.applier.applied().len(), 2);
        handle.abort();
    }
}
