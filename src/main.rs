//! signal-herald - Multi-Chain Signal Copy-Trading Engine
//!
//! Reads structured trade signals on stdin and fans each one out to every
//! subscribed user.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use signal_herald::adapters::cli::{
    CliApp, Command, RegisterCmd, RunCmd, SetCmd, StatsCmd, WalletCmd,
};
use signal_herald::adapters::evm::EvmAdapter;
use signal_herald::adapters::solana::SolanaAdapter;
use signal_herald::adapters::ton::TonAdapter;
use signal_herald::adapters::ChainAdapters;
use signal_herald::application::{Dispatcher, PositionMonitor};
use signal_herald::config::{load_config, Config};
use signal_herald::domain::ledger::PositionLedger;
use signal_herald::domain::registry::UserRegistry;
use signal_herald::domain::signal::{ChainFamily, Signal};
use signal_herald::storage::JsonStore;
use signal_herald::vault::{load_master_key, WalletVault};

const WALLET_SECRET_ENV: &str = "WALLET_SECRET";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (secrets go here, not in config.toml)
    dotenvy::dotenv().ok();

    let app = CliApp::parse();
    let config = load_config(&app.config)
        .with_context(|| format!("Failed to load configuration from {}", app.config.display()))?;
    init_logging(app.verbose, app.debug, &config.logging.level);

    match app.command {
        Command::Run(cmd) => run_command(&config, cmd).await,
        Command::Users => users_command(&config).await,
        Command::Stats(cmd) => stats_command(&config, cmd).await,
        Command::Register(cmd) => register_command(&config, cmd).await,
        Command::AddWallet(cmd) => add_wallet_command(&config, cmd).await,
        Command::RemoveWallet(cmd) => remove_wallet_command(&config, cmd).await,
        Command::Set(cmd) => set_command(&config, cmd).await,
    }
}

fn init_logging(verbose: bool, debug: bool, config_level: &str) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config_level))
    };
    fmt().with_env_filter(filter).init();
}

/// The persistent core every command needs: users, positions, wallets.
struct Engine {
    registry: Arc<UserRegistry>,
    ledger: Arc<PositionLedger>,
    vault: Arc<WalletVault>,
}

fn build_engine(config: &Config) -> Result<Engine> {
    let data_dir = config.storage.data_dir();
    let registry = Arc::new(
        UserRegistry::load(JsonStore::open(&data_dir, "users.json")?)
            .context("Failed to load user registry")?,
    );
    let ledger = Arc::new(
        PositionLedger::load(
            JsonStore::open(&data_dir, "positions.json")?,
            Arc::clone(&registry),
        )
        .context("Failed to load position ledger")?,
    );
    let master_key = load_master_key(&data_dir).context("Failed to load vault master key")?;
    let vault = Arc::new(
        WalletVault::load(JsonStore::open(&data_dir, "wallets.json")?, &master_key)
            .context("Failed to open wallet vault")?,
    );
    Ok(Engine {
        registry,
        ledger,
        vault,
    })
}

fn build_adapters(config: &Config) -> Result<ChainAdapters> {
    let mut adapters = ChainAdapters::new();
    if let Some(settings) = config.solana_settings() {
        adapters.insert(Arc::new(
            SolanaAdapter::new(settings).context("Failed to build Solana adapter")?,
        ));
    }
    if let Some(settings) = config.evm_settings() {
        adapters.insert(Arc::new(
            EvmAdapter::new(settings).context("Failed to build EVM adapter")?,
        ));
    }
    if let Some(settings) = config.ton_settings() {
        adapters.insert(Arc::new(
            TonAdapter::new(settings).context("Failed to build TON adapter")?,
        ));
    }
    Ok(adapters)
}

async fn run_command(config: &Config, cmd: RunCmd) -> Result<()> {
    let engine = build_engine(config)?;
    let adapters = build_adapters(config)?;
    let global_dry_run = config.engine.dry_run || cmd.dry_run;
    if global_dry_run {
        warn!("Dry-run mode: every entry will be simulated");
    }
    info!(
        chains = ?adapters.families(),
        users = engine.registry.list().await.len(),
        "signal-herald starting"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor = PositionMonitor::new(
        Arc::clone(&engine.registry),
        Arc::clone(&engine.ledger),
        Arc::clone(&engine.vault),
        adapters.clone(),
        config.monitor_interval(),
    );
    let monitor_handle = monitor.spawn(shutdown_rx);

    let dispatcher = Dispatcher::new(
        engine.registry,
        engine.ledger,
        engine.vault,
        adapters,
        global_dry_run,
    );

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line.context("Failed to read signal input")? {
                Some(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Signal>(&line) {
                        Ok(signal) => {
                            let outcomes = dispatcher.handle_signal(&signal).await;
                            println!("{}", serde_json::to_string(&outcomes)?);
                        }
                        Err(e) => warn!(%e, "Ignoring malformed signal line"),
                    }
                }
                None => {
                    info!("Signal input closed, shutting down");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received, shutting down");
                break;
            }
        }
    }

    shutdown_tx.send(true).ok();
    monitor_handle
        .await
        .context("Monitor task did not shut down cleanly")?;
    Ok(())
}

async fn users_command(config: &Config) -> Result<()> {
    let engine = build_engine(config)?;
    let users = engine.registry.list().await;
    if users.is_empty() {
        println!("No users registered.");
        return Ok(());
    }
    for user in users {
        let wallets: Vec<String> = engine
            .vault
            .wallets_of(user.user_id)
            .await
            .into_iter()
            .map(|(chain, _)| chain.to_string())
            .collect();
        println!(
            "{:>8}  {:<16}  capital {:>5.1}%  max {:>2}  auto {:<5}  dry-run {:<5}  wallets [{}]{}",
            user.user_id,
            user.username.as_deref().unwrap_or("-"),
            user.capital_pct,
            user.max_positions,
            user.auto_trade,
            user.dry_run,
            wallets.join(", "),
            if user.is_admin { "  admin" } else { "" },
        );
    }
    Ok(())
}

async fn stats_command(config: &Config, cmd: StatsCmd) -> Result<()> {
    let engine = build_engine(config)?;
    let Some(user) = engine.registry.get(cmd.user_id).await else {
        bail!("Unknown user: {}", cmd.user_id);
    };

    println!("User {}", user.user_id);
    if let Some(name) = &user.username {
        println!("  username:     {name}");
    }
    println!("  capital:      {:.1}% per trade", user.capital_pct);
    println!("  max open:     {}", user.max_positions);
    println!("  slippage:     {} bps", user.slippage_bps);
    println!(
        "  targets:      -{:.1}% SL / +{:.1}% TP",
        user.stop_loss_pct, user.take_profit_pct
    );
    println!("  auto-trade:   {}", user.auto_trade);
    println!("  dry-run:      {}", user.dry_run);
    println!(
        "  stats:        {} trades, {} wins, {} losses ({:.1}% win rate), pnl {:.4}",
        user.stats.trades,
        user.stats.wins,
        user.stats.losses,
        user.stats.win_rate(),
        user.stats.pnl,
    );

    let positions = engine.ledger.user_positions(cmd.user_id).await;
    if positions.is_empty() {
        println!("  positions:    none");
        return Ok(());
    }
    println!("  positions:");
    for p in positions {
        println!(
            "    #{:<5} {:<12} {:<8} entry {:<12.6} qty {:<12.6} {:?}{}{}",
            p.id,
            p.pair,
            p.chain,
            p.entry_price,
            p.quantity,
            p.status,
            p.pnl.map(|v| format!("  pnl {v:.4}")).unwrap_or_default(),
            if p.simulated { "  (simulated)" } else { "" },
        );
    }
    Ok(())
}

async fn register_command(config: &Config, cmd: RegisterCmd) -> Result<()> {
    let engine = build_engine(config)?;
    let user = engine.registry.register(cmd.user_id, cmd.username).await?;
    println!(
        "Registered user {}{}",
        user.user_id,
        if user.is_admin { " (admin)" } else { "" }
    );
    Ok(())
}

async fn add_wallet_command(config: &Config, cmd: WalletCmd) -> Result<()> {
    let engine = build_engine(config)?;
    if engine.registry.get(cmd.user_id).await.is_none() {
        bail!("Unknown user: {}", cmd.user_id);
    }
    let chain: ChainFamily = cmd.chain.parse()?;
    // The secret comes from the environment so it never lands in shell
    // history or process listings.
    let secret = std::env::var(WALLET_SECRET_ENV)
        .with_context(|| format!("Set {WALLET_SECRET_ENV} to the wallet secret"))?;
    let address = engine.vault.add_credential(cmd.user_id, chain, &secret).await?;
    println!("Stored {chain} wallet for user {}: {address}", cmd.user_id);
    Ok(())
}

async fn remove_wallet_command(config: &Config, cmd: WalletCmd) -> Result<()> {
    let engine = build_engine(config)?;
    let chain: ChainFamily = cmd.chain.parse()?;
    if engine.vault.remove_credential(cmd.user_id, chain).await? {
        println!("Removed {chain} wallet for user {}", cmd.user_id);
    } else {
        println!("User {} has no {chain} wallet", cmd.user_id);
    }
    Ok(())
}

async fn set_command(config: &Config, cmd: SetCmd) -> Result<()> {
    let engine = build_engine(config)?;
    let user_id = cmd.user_id;
    let value = cmd.value.as_str();
    match cmd.setting.as_str() {
        "capital_pct" => {
            let pct: f64 = value.parse().context("capital_pct takes a number")?;
            engine.registry.update(user_id, |u| u.set_capital_pct(pct)).await?;
        }
        "max_positions" => {
            let max: u32 = value.parse().context("max_positions takes an integer")?;
            engine.registry.update(user_id, |u| u.set_max_positions(max)).await?;
        }
        "slippage_bps" => {
            let bps: u16 = value.parse().context("slippage_bps takes an integer")?;
            engine.registry.update(user_id, |u| u.set_slippage_bps(bps)).await?;
        }
        "stop_loss_pct" => {
            let pct: f64 = value.parse().context("stop_loss_pct takes a number")?;
            engine.registry.update(user_id, |u| u.set_stop_loss_pct(pct)).await?;
        }
        "take_profit_pct" => {
            let pct: f64 = value.parse().context("take_profit_pct takes a number")?;
            engine.registry.update(user_id, |u| u.set_take_profit_pct(pct)).await?;
        }
        "auto_trade" => {
            let enabled: bool = value.parse().context("auto_trade takes true or false")?;
            engine.registry.set_auto_trade(user_id, enabled).await?;
        }
        "dry_run" => {
            let enabled: bool = value.parse().context("dry_run takes true or false")?;
            engine.registry.set_dry_run(user_id, enabled).await?;
        }
        other => bail!(
            "Unknown setting '{other}'. Valid: capital_pct, max_positions, slippage_bps, \
             stop_loss_pct, take_profit_pct, auto_trade, dry_run"
        ),
    }
    println!("Updated {} for user {}", cmd.setting, user_id);
    Ok(())
}
