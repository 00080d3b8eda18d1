//! CLI Adapter
//!
//! Command-line interface for the signal-herald engine.
//! Uses clap derive macros for argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// signal-herald - multi-chain signal copy-trading engine
#[derive(Parser, Debug)]
#[command(
    name = "signal-herald",
    version = env!("CARGO_PKG_VERSION"),
    about = "Multi-chain signal copy-trading engine",
    long_about = "signal-herald fans trade signals out to every subscribed user, \
                  executes entries through per-chain DEX aggregators and watches \
                  open positions against per-user stop-loss/take-profit targets."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "config/signal-herald.toml",
        global = true
    )]
    pub config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the engine: read newline-delimited JSON signals on stdin
    Run(RunCmd),

    /// List registered users
    Users,

    /// Show one user's settings, stats and positions
    Stats(StatsCmd),

    /// Register a new user
    Register(RegisterCmd),

    /// Encrypt and store a wallet secret (read from WALLET_SECRET env var)
    AddWallet(WalletCmd),

    /// Remove a stored wallet credential
    RemoveWallet(WalletCmd),

    /// Change one user setting
    Set(SetCmd),
}

/// Run the engine loop
#[derive(Parser, Debug)]
pub struct RunCmd {
    /// Simulate every entry, regardless of per-user settings
    #[arg(long)]
    pub dry_run: bool,
}

/// Show user details
#[derive(Parser, Debug)]
pub struct StatsCmd {
    /// User id
    #[arg(value_name = "USER_ID")]
    pub user_id: u64,
}

/// Register a user
#[derive(Parser, Debug)]
pub struct RegisterCmd {
    /// User id
    #[arg(value_name = "USER_ID")]
    pub user_id: u64,

    /// Display name
    #[arg(short, long)]
    pub username: Option<String>,
}

/// Add or remove a wallet credential
#[derive(Parser, Debug)]
pub struct WalletCmd {
    /// User id
    #[arg(value_name = "USER_ID")]
    pub user_id: u64,

    /// Chain family: solana, evm or ton
    #[arg(value_name = "CHAIN")]
    pub chain: String,
}

/// Change a user setting
#[derive(Parser, Debug)]
pub struct SetCmd {
    /// User id
    #[arg(value_name = "USER_ID")]
    pub user_id: u64,

    /// Setting name: capital_pct, max_positions, slippage_bps,
    /// stop_loss_pct, take_profit_pct, auto_trade or dry_run
    #[arg(value_name = "SETTING")]
    pub setting: String,

    /// New value
    #[arg(value_name = "VALUE")]
    pub value: String,
}
