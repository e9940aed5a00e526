//! In-memory ledger and oracle for engine tests

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};

use crate::error::{Error, Result};
use crate::price::PriceOracle;
use crate::wallet::{LedgerGateway, TransferRequest};

#[derive(Default)]
pub(crate) struct FakeLedger {
    balance: AtomicU64,
    fail_balance: bool,
    reject_submits: bool,
    debit_on_submit: bool,
    submit_delay: Option<Duration>,
    balance_calls: AtomicUsize,
    submitted: Mutex<Vec<u64>>,
}

impl FakeLedger {
    pub(crate) fn with_balance(lamports: u64) -> Self {
        Self {
            balance: AtomicU64::new(lamports),
            ..Default::default()
        }
    }

    pub(crate) fn failing_balance() -> Self {
        Self {
            fail_balance: true,
            ..Default::default()
        }
    }

    pub(crate) fn rejecting_submits(mut self) -> Self {
        self.reject_submits = true;
        self
    }

    /// Accepted transfers reduce the balance, as a confirmed transfer would
    pub(crate) fn debiting_on_submit(mut self) -> Self {
        self.debit_on_submit = true;
        self
    }

    pub(crate) fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = Some(delay);
        self
    }

    pub(crate) fn set_balance(&self, lamports: u64) {
        self.balance.store(lamports, Ordering::SeqCst);
    }

    pub(crate) fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }

    /// Amounts of every submit attempt, accepted or not
    pub(crate) fn submitted(&self) -> Vec<u64> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl LedgerGateway for FakeLedger {
    async fn get_balance(&self, _address: &Pubkey) -> Result<u64> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_balance {
            return Err(Error::BalanceUnavailable("account not found".to_string()));
        }
        Ok(self.balance.load(Ordering::SeqCst))
    }

    async fn submit_transfer(
        &self,
        request: &TransferRequest,
        _signer: &Keypair,
    ) -> Result<Signature> {
        self.submitted.lock().unwrap().push(request.lamports);

        if let Some(delay) = self.submit_delay {
            tokio::time::sleep(delay).await;
        }
        if self.reject_submits {
            return Err(Error::LedgerSubmit("insufficient funds for fee".to_string()));
        }
        if self.debit_on_submit {
            self.balance.fetch_sub(request.lamports, Ordering::SeqCst);
        }
        Ok(Signature::new_unique())
    }
}

pub(crate) struct FakeOracle {
    rate: Option<f64>,
    calls: AtomicUsize,
}

impl FakeOracle {
    pub(crate) fn with_rate(rate: f64) -> Self {
        Self {
            rate: Some(rate),
            calls: AtomicUsize::new(0),
        }
    }

    /// Behaves like an upstream answering HTTP 500
    pub(crate) fn failing() -> Self {
        Self {
            rate: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceOracle for FakeOracle {
    async fn fetch_rate(&self, _base_asset: &str, _quote_currency: &str) -> Result<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.rate.ok_or_else(|| {
            Error::QuoteUnavailable("Quote API error 500 Internal Server Error".to_string())
        })
    }
}
