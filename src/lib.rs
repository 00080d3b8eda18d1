//! signal-herald - Multi-Chain Signal Copy-Trading Engine Library
//!
//! Fans structured trade signals out to every subscribed user, executes
//! entries through per-chain DEX aggregators and watches open positions
//! against per-user stop-loss/take-profit targets.
//!
//! # Modules
//!
//! - `domain`: Core business logic (Signal, Position, UserProfile, PositionLedger)
//! - `ports`: Trait abstractions (ChainAdapter) and test doubles
//! - `adapters`: External implementations (Solana/Jupiter, EVM aggregator, TON gateway, CLI)
//! - `vault`: Encrypted wallet credentials and scoped signers
//! - `storage`: Atomic JSON persistence
//! - `config`: Configuration loading and validation
//! - `application`: Dispatcher fan-out and the SL/TP monitor

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod storage;
pub mod vault;
