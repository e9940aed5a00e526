//! Sweep decision engine
//!
//! ```text
//! try_lock ──► evaluate ──► threshold? ──► fee reserve? ──► submit
//!    │            │             │               │             │
//! InProgress   Failed   BelowThreshold   Insufficient    Sent / Failed
//! ```
//!
//! Every invocation decides from scratch; there is no "already swept" state.
//! After a confirmed sweep the balance sits at the fee reserve, so the next
//! call skips on its own (`BelowThreshold`, or `InsufficientAfterFeeReserve`
//! if the rate alone makes the reserve look valuable).
//!
//! At most one sweep per wallet is in flight. A call that finds the guard
//! held returns `SweepInProgress` instead of queueing behind it, so two
//! overlapping triggers can never both submit.

use std::fmt;
use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use tokio::sync::Mutex;
use tracing::{error, info};

use super::evaluator::{AssetPair, BalanceEvaluator, Valuation, NATIVE_SYMBOL};
use crate::error::{Error, Result};
use crate::price::PriceOracle;
use crate::wallet::{lamports_to_sol, LedgerGateway, TransferRequest, Wallet};

/// Immutable sweep settings
#[derive(Debug, Clone, PartialEq)]
pub struct SweepPolicy {
    pub destination: Pubkey,
    /// Reference-currency value that triggers a sweep
    pub threshold: f64,
    /// Lamports kept back for the network fee
    pub fee_reserve_lamports: u64,
}

/// Why a sweep was not attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    BelowThreshold,
    /// Valuable only because of the rate; the balance cannot cover the reserve
    InsufficientAfterFeeReserve,
    /// Another sweep for this wallet is still running
    SweepInProgress,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::BelowThreshold => write!(f, "below threshold"),
            SkipReason::InsufficientAfterFeeReserve => {
                write!(f, "balance does not cover the fee reserve")
            }
            SkipReason::SweepInProgress => write!(f, "a sweep is already in progress"),
        }
    }
}

/// Result of one `maybe_sweep` call
#[derive(Debug)]
pub enum TransferOutcome {
    Sent {
        signature: Signature,
        request: TransferRequest,
    },
    Skipped {
        reason: SkipReason,
        /// Absent when the call never got as far as valuing the wallet
        valuation: Option<Valuation>,
    },
    Failed {
        error: Error,
    },
}

impl TransferOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, TransferOutcome::Sent { .. })
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            TransferOutcome::Skipped { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

/// Decides on and performs sweeps for one wallet
pub struct SweepEngine {
    evaluator: BalanceEvaluator,
    ledger: Arc<dyn LedgerGateway>,
    wallet: Wallet,
    policy: SweepPolicy,
    /// Single-flight guard
    in_flight: Mutex<()>,
}

impl SweepEngine {
    pub fn new(
        ledger: Arc<dyn LedgerGateway>,
        oracle: Arc<dyn PriceOracle>,
        wallet: Wallet,
        policy: SweepPolicy,
        pair: AssetPair,
    ) -> Self {
        Self {
            evaluator: BalanceEvaluator::new(ledger.clone(), oracle, pair),
            ledger,
            wallet,
            policy,
            in_flight: Mutex::new(()),
        }
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn policy(&self) -> &SweepPolicy {
        &self.policy
    }

    pub fn currency(&self) -> &str {
        &self.evaluator.pair().quote
    }

    /// Current valuation, without taking the sweep guard
    pub async fn evaluate(&self) -> Result<Valuation> {
        self.evaluator.evaluate(&self.wallet).await
    }

    /// Sweep the wallet if its value has reached the threshold
    pub async fn maybe_sweep(&self) -> TransferOutcome {
        let Ok(_guard) = self.in_flight.try_lock() else {
            info!("Sweep requested while another is in flight");
            return TransferOutcome::Skipped {
                reason: SkipReason::SweepInProgress,
                valuation: None,
            };
        };

        let valuation = match self.evaluate().await {
            Ok(v) => v,
            Err(e) => {
                error!("Sweep aborted, could not value wallet: {}", e);
                return TransferOutcome::Failed { error: e };
            }
        };

        if valuation.reference() < self.policy.threshold {
            info!(
                "Below threshold: {} < {} {}",
                valuation,
                self.policy.threshold,
                valuation.currency.to_uppercase()
            );
            return TransferOutcome::Skipped {
                reason: SkipReason::BelowThreshold,
                valuation: Some(valuation),
            };
        }

        let Some(request) = TransferRequest::sweep(
            self.wallet.address(),
            self.policy.destination,
            valuation.lamports,
            self.policy.fee_reserve_lamports,
        ) else {
            info!(
                "Threshold reached but {} lamports do not cover the {} lamport reserve",
                valuation.lamports, self.policy.fee_reserve_lamports
            );
            return TransferOutcome::Skipped {
                reason: SkipReason::InsufficientAfterFeeReserve,
                valuation: Some(valuation),
            };
        };

        info!(
            "Threshold reached ({}), sweeping {} {} to {}",
            valuation,
            request.sol(),
            NATIVE_SYMBOL,
            request.destination
        );

        match self
            .ledger
            .submit_transfer(&request, self.wallet.keypair())
            .await
        {
            Ok(signature) => TransferOutcome::Sent { signature, request },
            Err(e) => {
                error!("Sweep submission failed: {}", e);
                TransferOutcome::Failed { error: e }
            }
        }
    }
}

/// Chat-facing rendering of an outcome
impl fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferOutcome::Sent { signature, request } => write!(
                f,
                "Swept {:.6} {} to {}\nTx: {}",
                lamports_to_sol(request.lamports),
                NATIVE_SYMBOL,
                request.destination,
                signature
            ),
            TransferOutcome::Skipped {
                reason,
                valuation: Some(v),
            } => write!(f, "No sweep: {}. Current balance: {}", reason, v),
            TransferOutcome::Skipped {
                reason,
                valuation: None,
            } => write!(f, "No sweep: {}.", reason),
            TransferOutcome::Failed { error } => write!(f, "Sweep failed: {}", error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sweep::fakes::{FakeLedger, FakeOracle};
    use solana_sdk::signature::Keypair;
    use std::time::Duration;

    const RESERVE: u64 = 1_000_000;

    fn engine(ledger: Arc<FakeLedger>, oracle: Arc<FakeOracle>) -> (SweepEngine, Pubkey) {
        let destination = Pubkey::new_unique();
        let engine = SweepEngine::new(
            ledger,
            oracle,
            Wallet::new(Keypair::new()),
            SweepPolicy {
                destination,
                threshold: 300.0,
                fee_reserve_lamports: RESERVE,
            },
            AssetPair::new("solana", "usd"),
        );
        (engine, destination)
    }

    #[tokio::test]
    async fn test_sweeps_above_threshold() {
        let ledger = Arc::new(FakeLedger::with_balance(5_000_000_000));
        let (engine, destination) = engine(ledger.clone(), Arc::new(FakeOracle::with_rate(80.0)));

        let outcome = engine.maybe_sweep().await;

        match outcome {
            TransferOutcome::Sent { request, .. } => {
                assert_eq!(request.lamports, 4_999_000_000);
                assert_eq!(request.destination, destination);
                assert_eq!(request.source, engine.wallet().address());
            }
            other => panic!("expected Sent, got {other:?}"),
        }
        assert_eq!(ledger.submitted(), vec![4_999_000_000]);
    }

    #[tokio::test]
    async fn test_skips_below_threshold() {
        let ledger = Arc::new(FakeLedger::with_balance(1_000_000_000));
        let (engine, _) = engine(ledger.clone(), Arc::new(FakeOracle::with_rate(80.0)));

        let outcome = engine.maybe_sweep().await;

        match outcome {
            TransferOutcome::Skipped {
                reason: SkipReason::BelowThreshold,
                valuation: Some(v),
            } => assert_eq!(v.reference(), 80.0),
            other => panic!("expected BelowThreshold, got {other:?}"),
        }
        assert!(ledger.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_threshold_is_inclusive() {
        // 3.75 SOL * 80 = 300
        let ledger = Arc::new(FakeLedger::with_balance(3_750_000_000));
        let (engine, _) = engine(ledger.clone(), Arc::new(FakeOracle::with_rate(80.0)));

        assert!(engine.maybe_sweep().await.is_sent());
        assert_eq!(ledger.submitted(), vec![3_749_000_000]);
    }

    #[tokio::test]
    async fn test_rate_spike_on_dust_is_insufficient() {
        // 0.001 SOL at an absurd rate is "valuable" but only covers the reserve
        for balance in [RESERVE, RESERVE - 1, 1] {
            let ledger = Arc::new(FakeLedger::with_balance(balance));
            let (engine, _) = engine(ledger.clone(), Arc::new(FakeOracle::with_rate(1e12)));

            let outcome = engine.maybe_sweep().await;
            assert_eq!(
                outcome.skip_reason(),
                Some(SkipReason::InsufficientAfterFeeReserve),
                "balance {balance}"
            );
            assert!(ledger.submitted().is_empty());
        }
    }

    #[tokio::test]
    async fn test_quote_failure_fails_without_ledger_calls() {
        let ledger = Arc::new(FakeLedger::with_balance(5_000_000_000));
        let (engine, _) = engine(ledger.clone(), Arc::new(FakeOracle::failing()));

        let outcome = engine.maybe_sweep().await;

        assert!(matches!(
            outcome,
            TransferOutcome::Failed {
                error: Error::QuoteUnavailable(_)
            }
        ));
        assert_eq!(ledger.balance_calls(), 0);
        assert!(ledger.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_balance_failure_propagates() {
        let ledger = Arc::new(FakeLedger::failing_balance());
        let (engine, _) = engine(ledger.clone(), Arc::new(FakeOracle::with_rate(80.0)));

        let outcome = engine.maybe_sweep().await;

        assert!(matches!(
            outcome,
            TransferOutcome::Failed {
                error: Error::BalanceUnavailable(_)
            }
        ));
        assert!(ledger.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_submit_failure_is_not_success() {
        let ledger = Arc::new(FakeLedger::with_balance(5_000_000_000).rejecting_submits());
        let (engine, _) = engine(ledger.clone(), Arc::new(FakeOracle::with_rate(80.0)));

        let outcome = engine.maybe_sweep().await;

        assert!(matches!(
            outcome,
            TransferOutcome::Failed {
                error: Error::LedgerSubmit(_)
            }
        ));
        // One attempt, no retry
        assert_eq!(ledger.submitted(), vec![4_999_000_000]);
    }

    #[tokio::test]
    async fn test_second_sweep_skips() {
        let ledger = Arc::new(FakeLedger::with_balance(5_000_000_000).debiting_on_submit());
        let (engine, _) = engine(ledger.clone(), Arc::new(FakeOracle::with_rate(80.0)));

        assert!(engine.maybe_sweep().await.is_sent());
        let second = engine.maybe_sweep().await;

        // The leftover reserve is worth far less than the threshold
        assert_eq!(second.skip_reason(), Some(SkipReason::BelowThreshold));
        assert_eq!(ledger.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_sweeps_submit_once() {
        let ledger = Arc::new(
            FakeLedger::with_balance(5_000_000_000).with_submit_delay(Duration::from_millis(50)),
        );
        let (engine, _) = engine(ledger.clone(), Arc::new(FakeOracle::with_rate(80.0)));

        let (a, b) = tokio::join!(engine.maybe_sweep(), engine.maybe_sweep());

        let sent = [&a, &b].iter().filter(|o| o.is_sent()).count();
        assert_eq!(sent, 1);
        assert!([&a, &b]
            .iter()
            .any(|o| o.skip_reason() == Some(SkipReason::SweepInProgress)));
        assert_eq!(ledger.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_guard_released_after_failure() {
        let ledger = Arc::new(FakeLedger::failing_balance());
        let (engine, _) = engine(ledger.clone(), Arc::new(FakeOracle::with_rate(80.0)));

        assert!(matches!(engine.maybe_sweep().await, TransferOutcome::Failed { .. }));
        // A stuck guard would report SweepInProgress here
        assert!(matches!(engine.maybe_sweep().await, TransferOutcome::Failed { .. }));
    }

    #[test]
    fn test_outcome_rendering() {
        let request =
            TransferRequest::sweep(Pubkey::new_unique(), Pubkey::new_unique(), 5_000_000_000, RESERVE)
                .unwrap();
        let sent = TransferOutcome::Sent {
            signature: Signature::default(),
            request,
        };
        assert!(sent.to_string().starts_with("Swept 4.999000 SOL to "));

        let busy = TransferOutcome::Skipped {
            reason: SkipReason::SweepInProgress,
            valuation: None,
        };
        assert_eq!(busy.to_string(), "No sweep: a sweep is already in progress.");

        let failed = TransferOutcome::Failed {
            error: Error::QuoteUnavailable("HTTP 500".to_string()),
        };
        assert_eq!(failed.to_string(), "Sweep failed: Quote unavailable: HTTP 500");
    }
}
