//! Price feed for wallet valuation

pub mod oracle;

pub use oracle::{CoinGeckoOracle, PriceOracle};
