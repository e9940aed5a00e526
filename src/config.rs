//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::de::{self, Deserializer, SeqAccess, Unexpected, Visitor};
use serde::Deserialize;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub rpc: RpcConfig,
    pub price: PriceConfig,
    pub sweep: SweepConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_rpc_timeout_ms")]
    pub timeout_ms: u64,
    /// processed, confirmed or finalized
    #[serde(default = "default_commitment")]
    pub commitment: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceConfig {
    #[serde(default = "default_price_endpoint")]
    pub endpoint: String,
    /// Quote service id of the native asset
    #[serde(default = "default_asset_id")]
    pub asset_id: String,
    /// Reference currency the threshold is expressed in
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_price_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweepConfig {
    /// Where swept funds go. Required.
    #[serde(default)]
    pub destination: String,
    /// Reference-currency value at which a sweep fires
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Lamports left behind to pay the transfer fee
    #[serde(default = "default_fee_reserve_lamports")]
    pub fee_reserve_lamports: u64,
    /// Background sweep interval; 0 disables it
    #[serde(default)]
    pub auto_interval_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WalletConfig {
    /// Solana CLI keypair file. A throwaway keypair is generated when unset.
    #[serde(default)]
    pub keypair_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    /// Chats allowed to issue commands; empty allows all
    #[serde(default, deserialize_with = "deserialize_chat_ids")]
    pub allowed_chat_ids: Vec<i64>,
}

/// A TOML array, a single id, or a comma-separated string
///
/// The environment source hands over `"42"` as an integer and `"42,43"` as a
/// list of strings, so every shape ends up here.
fn deserialize_chat_ids<'de, D>(deserializer: D) -> std::result::Result<Vec<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(ChatIds)
}

struct ChatIds;

struct ChatIdList(Vec<i64>);

impl<'de> Deserialize<'de> for ChatIdList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(ChatIds).map(ChatIdList)
    }
}

impl<'de> Visitor<'de> for ChatIds {
    type Value = Vec<i64>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a chat id or a list of chat ids")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Self::Value, E> {
        Ok(vec![v])
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Self::Value, E> {
        i64::try_from(v)
            .map(|id| vec![id])
            .map_err(|_| E::invalid_value(Unexpected::Unsigned(v), &self))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
        v.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<i64>()
                    .map_err(|_| E::invalid_value(Unexpected::Str(s), &self))
            })
            .collect()
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut ids = Vec::new();
        while let Some(ChatIdList(part)) = seq.next_element()? {
            ids.extend(part);
        }
        Ok(ids)
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base: default_telegram_api_base(),
            poll_timeout_secs: default_poll_timeout_secs(),
            allowed_chat_ids: vec![],
        }
    }
}

// Default value functions
fn default_rpc_endpoint() -> String {
    "https://api.mainnet-beta.solana.com".to_string()
}
fn default_rpc_timeout_ms() -> u64 {
    30_000
}
fn default_commitment() -> String {
    "confirmed".to_string()
}
fn default_price_endpoint() -> String {
    "https://api.coingecko.com/api/v3/simple/price".to_string()
}
fn default_asset_id() -> String {
    "solana".to_string()
}
fn default_currency() -> String {
    "usd".to_string()
}
fn default_price_timeout_ms() -> u64 {
    10_000
}
fn default_threshold() -> f64 {
    300.0
}
fn default_fee_reserve_lamports() -> u64 {
    1_000_000
}
fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}
fn default_poll_timeout_secs() -> u64 {
    30
}

impl Config {
    /// Load configuration from file and environment
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("rpc.endpoint", default_rpc_endpoint())?
            .set_default("rpc.timeout_ms", default_rpc_timeout_ms() as i64)?
            .set_default("price.endpoint", default_price_endpoint())?
            .set_default("sweep.threshold", default_threshold())?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix SWEEPER__)
            .add_source(environment())
            .build()
            .context("Failed to build configuration")?;

        let mut config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.apply_well_known_env();
        config.validate()?;

        Ok(config)
    }

    /// Fill blanks from the conventional variable names used in `.env` files
    fn apply_well_known_env(&mut self) {
        if self.telegram.bot_token.is_empty() {
            if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN") {
                self.telegram.bot_token = token;
            }
        }
        if self.sweep.destination.is_empty() {
            if let Ok(dest) = std::env::var("DESTINATION_WALLET") {
                self.sweep.destination = dest;
            }
        }
        if self.wallet.keypair_path.is_none() {
            self.wallet.keypair_path = std::env::var("KEYPAIR_PATH").ok();
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.sweep.destination.is_empty() {
            anyhow::bail!("sweep.destination is required (or set DESTINATION_WALLET)");
        }
        self.destination()?;

        if !self.sweep.threshold.is_finite() || self.sweep.threshold <= 0.0 {
            anyhow::bail!("sweep.threshold must be a positive number");
        }

        url::Url::parse(&self.rpc.endpoint)
            .with_context(|| format!("Invalid rpc.endpoint: {}", self.rpc.endpoint))?;
        url::Url::parse(&self.price.endpoint)
            .with_context(|| format!("Invalid price.endpoint: {}", self.price.endpoint))?;
        url::Url::parse(&self.telegram.api_base)
            .with_context(|| format!("Invalid telegram.api_base: {}", self.telegram.api_base))?;

        self.commitment()?;

        if self.price.asset_id.is_empty() || self.price.currency.is_empty() {
            anyhow::bail!("price.asset_id and price.currency must be set");
        }

        if self.sweep.fee_reserve_lamports == 0 {
            tracing::warn!(
                "sweep.fee_reserve_lamports is 0 - sweeps will be rejected for lack of fee funds"
            );
        }

        Ok(())
    }

    /// Destination address, parsed
    pub fn destination(&self) -> Result<Pubkey> {
        Pubkey::from_str(&self.sweep.destination)
            .with_context(|| format!("Invalid sweep.destination: {}", self.sweep.destination))
    }

    /// Commitment level for RPC reads and confirmations
    pub fn commitment(&self) -> Result<CommitmentConfig> {
        CommitmentConfig::from_str(&self.rpc.commitment)
            .map_err(|_| anyhow::anyhow!("Unknown rpc.commitment: {}", self.rpc.commitment))
    }

    /// Bot token, required only when the chat bot runs
    pub fn require_bot_token(&self) -> Result<&str> {
        if self.telegram.bot_token.is_empty() {
            anyhow::bail!("telegram.bot_token is required (or set TELEGRAM_BOT_TOKEN)");
        }
        Ok(&self.telegram.bot_token)
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  RPC:
    endpoint: {}
    timeout: {}ms
    commitment: {}
  Price:
    endpoint: {}
    pair: {}/{}
    api_key: {}
  Sweep:
    destination: {}
    threshold: {} {}
    fee_reserve: {} lamports
    auto_interval: {}
  Wallet:
    keypair_path: {}
  Telegram:
    bot_token: {}
    allowed_chats: {}
"#,
            mask_url(&self.rpc.endpoint),
            self.rpc.timeout_ms,
            self.rpc.commitment,
            mask_url(&self.price.endpoint),
            self.price.asset_id,
            self.price.currency,
            mask_secret(&self.price.api_key),
            self.sweep.destination,
            self.sweep.threshold,
            self.price.currency.to_uppercase(),
            self.sweep.fee_reserve_lamports,
            if self.sweep.auto_interval_secs == 0 {
                "off".to_string()
            } else {
                format!("{}s", self.sweep.auto_interval_secs)
            },
            self.wallet
                .keypair_path
                .as_deref()
                .unwrap_or("(none; `run` generates one, other commands need it)"),
            mask_secret(&self.telegram.bot_token),
            if self.telegram.allowed_chat_ids.is_empty() {
                "any".to_string()
            } else {
                format!("{:?}", self.telegram.allowed_chat_ids)
            },
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

fn mask_secret(secret: &str) -> &'static str {
    if secret.is_empty() {
        "(not set)"
    } else {
        "***"
    }
}

/// `SWEEPER__SECTION__KEY` variables; list keys take comma-separated values
fn environment() -> config::Environment {
    config::Environment::with_prefix("SWEEPER")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("telegram.allowed_chat_ids")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc: RpcConfig {
                endpoint: default_rpc_endpoint(),
                timeout_ms: default_rpc_timeout_ms(),
                commitment: default_commitment(),
            },
            price: PriceConfig {
                endpoint: default_price_endpoint(),
                asset_id: default_asset_id(),
                currency: default_currency(),
                timeout_ms: default_price_timeout_ms(),
                api_key: String::new(),
            },
            sweep: SweepConfig {
                destination: String::new(),
                threshold: default_threshold(),
                fee_reserve_lamports: default_fee_reserve_lamports(),
                auto_interval_secs: 0,
            },
            wallet: WalletConfig::default(),
            telegram: TelegramConfig::default(),
        }
    }
}
