//! Periodic auto-sweep
//!
//! Calls `maybe_sweep` on a fixed interval. Shares the engine, and therefore
//! the single-flight guard, with chat-triggered sweeps.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::engine::{SkipReason, SweepEngine, TransferOutcome};

pub struct AutoSweeper {
    engine: Arc<SweepEngine>,
    period: Duration,
}

impl AutoSweeper {
    pub fn new(engine: Arc<SweepEngine>, period: Duration) -> Self {
        Self { engine, period }
    }

    /// Spawn the polling loop; it exits when `shutdown` fires
    pub fn start(self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        info!("Starting auto-sweep every {}s", self.period.as_secs());

        tokio::spawn(async move {
            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        log_outcome(&self.engine.maybe_sweep().await);
                    }
                    _ = shutdown.recv() => {
                        info!("Auto-sweep shutting down");
                        break;
                    }
                }
            }
        })
    }
}

fn log_outcome(outcome: &TransferOutcome) {
    match outcome {
        TransferOutcome::Sent { signature, request } => {
            info!(
                "Auto-sweep sent {} lamports to {} (sig: {})",
                request.lamports, request.destination, signature
            );
        }
        TransferOutcome::Skipped {
            reason: SkipReason::BelowThreshold,
            ..
        } => debug!("Auto-sweep: {}", outcome),
        TransferOutcome::Skipped { .. } => warn!("Auto-sweep: {}", outcome),
        TransferOutcome::Failed { error } => error!("Auto-sweep failed: {}", error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sweep::evaluator::AssetPair;
    use crate::sweep::engine::SweepPolicy;
    use crate::sweep::fakes::{FakeLedger, FakeOracle};
    use crate::wallet::Wallet;
    use solana_sdk::pubkey::Pubkey;
    use solana_sdk::signature::Keypair;

    fn engine(ledger: Arc<FakeLedger>) -> Arc<SweepEngine> {
        Arc::new(SweepEngine::new(
            ledger,
            Arc::new(FakeOracle::with_rate(80.0)),
            Wallet::new(Keypair::new()),
            SweepPolicy {
                destination: Pubkey::new_unique(),
                threshold: 300.0,
                fee_reserve_lamports: 1_000_000,
            },
            AssetPair::new("solana", "usd"),
        ))
    }

    #[tokio::test]
    async fn test_sweeps_once_then_idles() {
        let ledger = Arc::new(FakeLedger::with_balance(5_000_000_000).debiting_on_submit());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle =
            AutoSweeper::new(engine(ledger.clone()), Duration::from_millis(10)).start(shutdown_rx);

        tokio::time::sleep(Duration::from_millis(80)).await;
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();

        assert_eq!(ledger.submitted(), vec![4_999_000_000]);
        assert!(ledger.balance_calls() >= 2);
    }

    #[tokio::test]
    async fn test_stops_on_shutdown() {
        let ledger = Arc::new(FakeLedger::with_balance(0));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle =
            AutoSweeper::new(engine(ledger), Duration::from_secs(3600)).start(shutdown_rx);
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
    }
}
