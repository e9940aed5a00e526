//! Solana Balance Sweeper Library
//!
//! Watches one wallet's USD value and sweeps it to a fixed address once a
//! threshold is crossed. Operated from Telegram or the command line.

pub mod bot;
pub mod cli;
pub mod config;
pub mod error;
pub mod price;
pub mod sweep;
pub mod wallet;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
