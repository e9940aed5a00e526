//! Balance-to-action pipeline
//!
//! ```text
//! LedgerGateway ─┐
//!                ├─► BalanceEvaluator ─► SweepEngine ─► LedgerGateway::submit_transfer
//! PriceOracle ───┘                           ▲
//!                               AutoSweeper ─┘ (optional)
//! ```

pub mod engine;
pub mod evaluator;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod fakes;

pub use engine::{SkipReason, SweepEngine, SweepPolicy, TransferOutcome};
pub use evaluator::{valuate, AssetPair, BalanceEvaluator, Valuation, NATIVE_SYMBOL};
pub use scheduler::AutoSweeper;
