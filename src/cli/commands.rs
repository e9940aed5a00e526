//! CLI command implementations

use anyhow::Result;
use dialoguer::Confirm;
use solana_sdk::signature::Keypair;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::bot::{CommandSurface, TelegramApi, TelegramBot};
use crate::config::Config;
use crate::error::Error;
use crate::price::{CoinGeckoOracle, PriceOracle};
use crate::sweep::{AssetPair, AutoSweeper, SweepEngine, SweepPolicy, TransferOutcome};
use crate::wallet::{RpcLedger, Wallet};

/// Wallet for one-shot commands
///
/// These exit right after printing, so a generated key would be gone before
/// anything sent to its address could be swept out again.
pub fn load_wallet(config: &Config) -> Result<Wallet> {
    let path = config.wallet.keypair_path.as_deref().ok_or_else(|| {
        Error::Config(
            "wallet.keypair_path is required (or set KEYPAIR_PATH); \
             create one with `sweeper keygen`"
                .to_string(),
        )
    })?;
    Ok(Wallet::load(Path::new(path))?)
}

/// Wire the ledger, oracle and wallet into a sweep engine
pub fn build_engine(config: &Config, wallet: Wallet) -> Result<Arc<SweepEngine>> {
    let ledger = Arc::new(build_ledger(config)?);
    let oracle = Arc::new(build_oracle(config)?);

    let policy = SweepPolicy {
        destination: config.destination()?,
        threshold: config.sweep.threshold,
        fee_reserve_lamports: config.sweep.fee_reserve_lamports,
    };

    Ok(Arc::new(SweepEngine::new(
        ledger,
        oracle,
        wallet,
        policy,
        AssetPair::new(&config.price.asset_id, &config.price.currency),
    )))
}

fn build_ledger(config: &Config) -> Result<RpcLedger> {
    Ok(RpcLedger::new(
        config.rpc.endpoint.clone(),
        Duration::from_millis(config.rpc.timeout_ms),
        config.commitment()?,
    ))
}

fn build_oracle(config: &Config) -> Result<CoinGeckoOracle> {
    Ok(CoinGeckoOracle::new(
        config.price.endpoint.clone(),
        Duration::from_millis(config.price.timeout_ms),
        Some(config.price.api_key.clone()),
    )?)
}

/// Run the Telegram bot (and the auto-sweeper, if enabled) until Ctrl-C
pub async fn run(config: &Config) -> Result<()> {
    let token = config.require_bot_token()?;
    // The bot outlives its wallet's deposits, so an in-memory key is usable here
    let wallet = Wallet::load_or_generate(config.wallet.keypair_path.as_deref())?;
    let engine = build_engine(config, wallet)?;

    info!("Starting sweeper...");
    info!(
        "Wallet: {}, destination: {}, threshold: {} {}",
        engine.wallet().address(),
        engine.policy().destination,
        engine.policy().threshold,
        config.price.currency.to_uppercase()
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let auto_sweep = if config.sweep.auto_interval_secs > 0 {
        Some(
            AutoSweeper::new(
                engine.clone(),
                Duration::from_secs(config.sweep.auto_interval_secs),
            )
            .start(shutdown_tx.subscribe()),
        )
    } else {
        info!("Auto-sweep disabled; sweeps run only on /trigger");
        None
    };

    let api = TelegramApi::new(
        &config.telegram.api_base,
        token,
        Duration::from_secs(config.telegram.poll_timeout_secs),
    )?;
    let bot = TelegramBot::new(
        api,
        Arc::new(CommandSurface::new(engine)),
        config.telegram.allowed_chat_ids.iter().copied(),
        config.telegram.poll_timeout_secs,
    );

    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            let _ = ctrl_c_tx.send(());
        }
    });

    let result = bot.run(shutdown_tx.subscribe()).await;

    // The bot can also stop on its own (bad token); take the scheduler down with it
    let _ = shutdown_tx.send(());
    if let Some(handle) = auto_sweep {
        let _ = handle.await;
    }

    result.map_err(Into::into)
}

/// Print the current valuation
pub async fn status(config: &Config) -> Result<()> {
    let engine = build_engine(config, load_wallet(config)?)?;
    let valuation = engine.evaluate().await?;

    println!("\n=== SWEEPER STATUS ===\n");
    println!("Wallet:      {}", engine.wallet().address());
    println!("Balance:     {}", valuation);
    println!("Rate:        {} {}/SOL", valuation.rate, valuation.currency.to_uppercase());
    println!(
        "Threshold:   {} {}",
        engine.policy().threshold,
        valuation.currency.to_uppercase()
    );
    println!("Destination: {}", engine.policy().destination);
    println!("As of:       {}", valuation.taken_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!(
        "Would sweep: {}",
        if valuation.reference() >= engine.policy().threshold {
            "yes"
        } else {
            "no"
        }
    );

    Ok(())
}

/// One manual sweep attempt
pub async fn sweep(config: &Config, yes: bool) -> Result<()> {
    let engine = build_engine(config, load_wallet(config)?)?;

    if !yes {
        let valuation = engine.evaluate().await?;
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Wallet holds {}. Sweep to {} if at or above {} {}? This cannot be undone.",
                valuation,
                engine.policy().destination,
                engine.policy().threshold,
                valuation.currency.to_uppercase()
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            info!("Sweep cancelled by user");
            return Ok(());
        }
    }

    let outcome = engine.maybe_sweep().await;
    println!("{}", outcome);

    match outcome {
        TransferOutcome::Failed { error } => Err(error.into()),
        _ => Ok(()),
    }
}

/// Print the deposit address
pub fn address(config: &Config) -> Result<()> {
    let wallet = load_wallet(config)?;
    println!("{}", wallet.address());
    Ok(())
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

/// Check RPC, price feed and (if configured) the bot token
pub async fn health(config: &Config) -> Result<()> {
    println!("\n=== SYSTEM HEALTH CHECK ===\n");

    let mut all_healthy = true;

    print!("RPC Endpoint... ");
    match build_ledger(config)?.health().await {
        Ok((slot, latency)) => println!("OK (slot {}, {}ms)", slot, latency),
        Err(e) => {
            println!("FAILED: {}", e);
            all_healthy = false;
        }
    }

    print!("Price feed... ");
    match build_oracle(config)?
        .fetch_rate(&config.price.asset_id, &config.price.currency)
        .await
    {
        Ok(rate) => println!(
            "OK ({} {}/SOL)",
            rate,
            config.price.currency.to_uppercase()
        ),
        Err(e) => {
            println!("FAILED: {}", e);
            all_healthy = false;
        }
    }

    if config.telegram.bot_token.is_empty() {
        println!("Telegram... NOT CONFIGURED");
    } else {
        print!("Telegram... ");
        let api = TelegramApi::new(
            &config.telegram.api_base,
            &config.telegram.bot_token,
            Duration::from_secs(5),
        )?;
        match api.get_me().await {
            Ok(me) => println!("OK (@{})", me.username.unwrap_or_default()),
            Err(e) => {
                println!("FAILED: {}", e);
                all_healthy = false;
            }
        }
    }

    println!();
    if all_healthy {
        println!("All systems healthy");
        Ok(())
    } else {
        error!("Health check failed");
        Err(anyhow::anyhow!("One or more health checks failed"))
    }
}

/// Generate a keypair file for the swept wallet
pub fn keygen(out: &Path, force: bool) -> Result<()> {
    let wallet = Wallet::new(Keypair::new());
    wallet.write(out, force)?;

    println!("Address: {}", wallet.address());
    println!("Keypair: {}", out.display());
    warn!("Back up {} - funds sent to this address depend on it", out.display());
    Ok(())
}
