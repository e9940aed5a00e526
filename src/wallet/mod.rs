//! Wallet and ledger access
//!
//! ```text
//! Wallet (keypair) ──► TransferRequest ──► LedgerGateway ──► Solana RPC
//! ```
//!
//! The wallet is loaded once at startup and shared read-only.

pub mod credentials;
pub mod ledger;
pub mod transfer;

pub use credentials::Wallet;
pub use ledger::{LedgerGateway, RpcLedger};
pub use transfer::{lamports_to_sol, TransferRequest, LAMPORTS_PER_SOL};
