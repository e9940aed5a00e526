//! SOL transfer instructions
//!
//! A `TransferRequest` can only be built with a positive amount that leaves the
//! fee reserve untouched.

use solana_sdk::{instruction::Instruction, pubkey::Pubkey, system_instruction};

/// Lamports in one SOL
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// A funds-transfer instruction ready for signing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRequest {
    pub source: Pubkey,
    pub destination: Pubkey,
    pub lamports: u64,
}

impl TransferRequest {
    /// Build a request that moves everything except `fee_reserve`
    ///
    /// Returns `None` when nothing would be left to send.
    pub fn sweep(
        source: Pubkey,
        destination: Pubkey,
        balance: u64,
        fee_reserve: u64,
    ) -> Option<Self> {
        match balance.checked_sub(fee_reserve) {
            Some(lamports) if lamports > 0 => Some(Self {
                source,
                destination,
                lamports,
            }),
            _ => None,
        }
    }

    /// System program transfer instruction
    pub fn instruction(&self) -> Instruction {
        system_instruction::transfer(&self.source, &self.destination, self.lamports)
    }

    pub fn sol(&self) -> f64 {
        lamports_to_sol(self.lamports)
    }
}

/// Convert lamports to SOL
pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}
