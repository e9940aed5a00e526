//! Ledger gateway
//!
//! Balance queries and transfer submission against a Solana RPC node. The
//! sweep engine only sees the `LedgerGateway` trait so tests can swap in fakes.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    commitment_config::CommitmentConfig,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
    transaction::Transaction,
};
use tracing::{debug, info};

use super::transfer::TransferRequest;
use crate::error::{Error, Result};

/// Opaque boundary to the ledger network
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Current balance in lamports
    ///
    /// Fails with `Error::BalanceUnavailable`.
    async fn get_balance(&self, address: &Pubkey) -> Result<u64>;

    /// Sign and submit a transfer, returning the transaction signature
    ///
    /// Fails with `Error::LedgerSubmit`. A single attempt; never retried.
    async fn submit_transfer(&self, request: &TransferRequest, signer: &Keypair)
        -> Result<Signature>;
}

/// `LedgerGateway` over the nonblocking Solana RPC client
pub struct RpcLedger {
    rpc_client: RpcClient,
    /// Upper bound on each outbound call
    call_timeout: Duration,
}

impl RpcLedger {
    pub fn new(endpoint: String, call_timeout: Duration, commitment: CommitmentConfig) -> Self {
        Self {
            rpc_client: RpcClient::new_with_timeout_and_commitment(
                endpoint,
                call_timeout,
                commitment,
            ),
            call_timeout,
        }
    }

    /// Current slot and round-trip latency in ms, for health checks
    pub async fn health(&self) -> Result<(u64, u64)> {
        let start = Instant::now();
        let slot = tokio::time::timeout(self.call_timeout, self.rpc_client.get_slot())
            .await
            .map_err(|_| Error::BalanceUnavailable("get_slot timed out".to_string()))?
            .map_err(|e| Error::BalanceUnavailable(format!("get_slot failed: {}", e)))?;
        Ok((slot, start.elapsed().as_millis() as u64))
    }
}

#[async_trait]
impl LedgerGateway for RpcLedger {
    async fn get_balance(&self, address: &Pubkey) -> Result<u64> {
        debug!("Fetching balance for {}", address);

        tokio::time::timeout(self.call_timeout, self.rpc_client.get_balance(address))
            .await
            .map_err(|_| {
                Error::BalanceUnavailable(format!(
                    "get_balance timed out after {}ms",
                    self.call_timeout.as_millis()
                ))
            })?
            .map_err(|e| Error::BalanceUnavailable(format!("Failed to get balance: {}", e)))
    }

    async fn submit_transfer(
        &self,
        request: &TransferRequest,
        signer: &Keypair,
    ) -> Result<Signature> {
        if signer.pubkey() != request.source {
            return Err(Error::LedgerSubmit(format!(
                "Signer {} does not own source {}",
                signer.pubkey(),
                request.source
            )));
        }

        debug!(
            "Executing transfer: {} lamports from {} to {}",
            request.lamports, request.source, request.destination
        );

        let blockhash = tokio::time::timeout(
            self.call_timeout,
            self.rpc_client.get_latest_blockhash(),
        )
        .await
        .map_err(|_| Error::LedgerSubmit("Timed out fetching blockhash".to_string()))?
        .map_err(|e| Error::LedgerSubmit(format!("Failed to get blockhash: {}", e)))?;

        let transaction = Transaction::new_signed_with_payer(
            &[request.instruction()],
            Some(&request.source),
            &[signer],
            blockhash,
        );

        // Confirmation makes the debit visible to the next balance read.
        let signature = tokio::time::timeout(
            self.call_timeout,
            self.rpc_client.send_and_confirm_transaction(&transaction),
        )
        .await
        .map_err(|_| {
            Error::LedgerSubmit(format!(
                "No confirmation within {}ms; status of {} unknown, check before retrying",
                self.call_timeout.as_millis(),
                transaction.signatures[0]
            ))
        })?
        .map_err(|e| Error::LedgerSubmit(format!("Transfer failed: {}", e)))?;

        info!(
            "Transfer complete: {} lamports to {} (sig: {})",
            request.lamports, request.destination, signature
        );

        Ok(signature)
    }
}
