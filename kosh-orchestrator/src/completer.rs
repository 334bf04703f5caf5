use std::time::Duration;

use tokio::sync::watch;

use crate::Orchestrator;

const SWEEP_INTERVAL: Duration = Duration::from_secs(5);
/// Scheduled completions fire within 10 s; anything pending past this grace
/// was lost and is re-driven here.
const OVERDUE_GRACE_SECS: i64 = 15;

/// At-least-once backstop for simulated-deposit completion.
///
/// The delayed task spawned at initiation normally completes the deposit;
/// this sweeper re-drives any pending simulated deposit whose task was lost
/// (for example across a crash of the spawning request). Completion is
/// idempotent on the transaction id, so double delivery is harmless.
pub async fn run(orchestrator: Orchestrator, mut shutdown: watch::Receiver<bool>) {
    let mut tick = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = tick.tick() => {
                for tx_id in orchestrator.overdue_simulated_deposits(OVERDUE_GRACE_SECS).await {
                    match orchestrator.complete_simulated_deposit(tx_id).await {
                        Ok(record) => {
                            tracing::info!(transaction = %tx_id, status = ?record.status, "overdue simulated deposit re-driven")
                        }
                        Err(e) => {
                            tracing::warn!(transaction = %tx_id, error = %e, "overdue completion failed, will retry next sweep")
                        }
                    }
                }
            }
            _ = shutdown.changed() => {
                tracing::info!("simulated-deposit completer shutting down");
                return;
            }
        }
    }
}
