//! Balance valuation
//!
//! Combines a fresh ledger balance with a fresh quote. Nothing is cached:
//! both inputs drift, and a stale one would produce a wrong sweep decision.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::Result;
use crate::price::PriceOracle;
use crate::wallet::{lamports_to_sol, LedgerGateway, Wallet};

/// Ticker shown next to native amounts
pub const NATIVE_SYMBOL: &str = "SOL";

/// Quote service identifiers for the asset pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPair {
    /// e.g. "solana"
    pub base: String,
    /// e.g. "usd"
    pub quote: String,
}

impl AssetPair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }
}

/// Wallet value at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct Valuation {
    pub lamports: u64,
    /// Reference-currency units per whole SOL
    pub rate: f64,
    pub currency: String,
    pub taken_at: DateTime<Utc>,
}

impl Valuation {
    /// Balance in whole SOL
    pub fn native(&self) -> f64 {
        lamports_to_sol(self.lamports)
    }

    /// Balance in the reference currency
    pub fn reference(&self) -> f64 {
        valuate(self.lamports, self.rate)
    }
}

impl fmt::Display for Valuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.4} {} ({:.2} {})",
            self.native(),
            NATIVE_SYMBOL,
            self.reference(),
            self.currency.to_uppercase()
        )
    }
}

/// `(lamports / LAMPORTS_PER_SOL) * rate`
pub fn valuate(lamports: u64, rate: f64) -> f64 {
    lamports_to_sol(lamports) * rate
}

/// Values a wallet from ledger balance and oracle rate
pub struct BalanceEvaluator {
    ledger: Arc<dyn LedgerGateway>,
    oracle: Arc<dyn PriceOracle>,
    pair: AssetPair,
}

impl BalanceEvaluator {
    pub fn new(
        ledger: Arc<dyn LedgerGateway>,
        oracle: Arc<dyn PriceOracle>,
        pair: AssetPair,
    ) -> Self {
        Self {
            ledger,
            oracle,
            pair,
        }
    }

    /// Fresh valuation of `wallet`
    ///
    /// The quote is fetched first so an unavailable price feed costs no
    /// ledger traffic. Errors from either side propagate unchanged.
    pub async fn evaluate(&self, wallet: &Wallet) -> Result<Valuation> {
        let rate = self
            .oracle
            .fetch_rate(&self.pair.base, &self.pair.quote)
            .await?;
        let lamports = self.ledger.get_balance(&wallet.address()).await?;

        let valuation = Valuation {
            lamports,
            rate,
            currency: self.pair.quote.clone(),
            taken_at: Utc::now(),
        };
        debug!("Valuation for {}: {}", wallet.address(), valuation);

        Ok(valuation)
    }

    pub fn pair(&self) -> &AssetPair {
        &self.pair
    }
}
