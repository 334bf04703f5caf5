use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::bootstrap::AppContext;

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const VERIFICATION_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Spawns the core's background tasks: the simulated-deposit completer,
/// session expiry cleanup, and verification-request expiry sweeping. All
/// honour the shutdown signal.
pub fn spawn_all(ctx: &AppContext, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
    vec![
        tokio::spawn(kosh_orchestrator::completer::run(
            ctx.orchestrator.clone(),
            shutdown.clone(),
        )),
        tokio::spawn(sweep_sessions(ctx.identity.clone(), shutdown.clone())),
        tokio::spawn(sweep_verifications(ctx.identity.clone(), shutdown)),
    ]
}

async fn sweep_sessions(
    identity: kosh_identity::IdentityService,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = tokio::time::interval(SESSION_SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = tick.tick() => match identity.sweep_expired_sessions().await {
                Ok(0) => {}
                Ok(n) => tracing::info!(swept = n, "expired sessions removed"),
                Err(e) => tracing::warn!(error = %e, "session sweep failed"),
            },
            _ = shutdown.changed() => {
                tracing::info!("session sweeper shutting down");
                return;
            }
        }
    }
}

async fn sweep_verifications(
    identity: kosh_identity::IdentityService,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = tokio::time::interval(VERIFICATION_SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = tick.tick() => match identity.sweep_expired_verifications().await {
                Ok(0) => {}
                Ok(n) => tracing::info!(swept = n, "verification requests expired"),
                Err(e) => tracing::warn!(error = %e, "verification sweep failed"),
            },
            _ = shutdown.changed() => {
                tracing::info!("verification sweeper shutting down");
                return;
            }
        }
    }
}
