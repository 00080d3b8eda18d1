//! Configuration Loader
//!
//! Loads and validates configuration from TOML files matching config.toml structure.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::adapters::evm::EvmSettings;
use crate::adapters::solana::SolanaSettings;
use crate::adapters::ton::TonSettings;
use crate::adapters::RetryPolicy;

/// Main configuration structure matching config.toml
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub engine: EngineSection,
    pub monitor: MonitorSection,
    pub storage: StorageSection,
    pub logging: LoggingSection,
    /// Chain families without a section stay unconfigured; signals for
    /// them resolve to per-user skips.
    #[serde(default)]
    pub solana: Option<SolanaSection>,
    #[serde(default)]
    pub evm: Option<EvmSection>,
    #[serde(default)]
    pub ton: Option<TonSection>,
}

/// Engine configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// Simulate every entry regardless of per-user settings
    #[serde(default)]
    pub dry_run: bool,
    /// HTTP timeout for all RPC and aggregator calls, seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Retry attempts for transient network errors
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Base backoff delay between retries, milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_base_delay_ms: u64,
}

/// Monitor configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSection {
    /// Seconds between SL/TP evaluation passes
    pub interval_secs: u64,
}

/// Storage configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    /// Directory for the user, position and wallet stores (~ expands)
    pub data_dir: String,
}

impl StorageSection {
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.data_dir).into_owned())
    }
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
}

/// Solana configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct SolanaSection {
    /// RPC endpoint (use private RPC for production)
    pub rpc_url: String,
    /// Jupiter V6 API base URL
    pub jupiter_api_url: String,
    /// Jupiter price API URL
    pub jupiter_price_url: String,
    /// USDC mint, the quote currency for sizing
    pub usdc_mint: String,
    /// Minimum trade size in USDC
    #[serde(default = "default_min_trade_size")]
    pub min_trade_size: f64,
}

impl SolanaSection {
    /// RPC URL with environment variable override (SOLANA_RPC_URL)
    pub fn get_rpc_url(&self) -> String {
        std::env::var("SOLANA_RPC_URL").unwrap_or_else(|_| self.rpc_url.clone())
    }
}

/// EVM configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct EvmSection {
    /// RPC endpoint (EVM_RPC_URL env var overrides)
    pub rpc_url: String,
    /// Swap aggregator API base URL
    pub aggregator_url: String,
    /// USDC token contract, the quote currency for sizing
    pub usdc_address: String,
    /// Aggregator router contract that receives allowances
    pub router_address: String,
    pub chain_id: u64,
    /// Minimum trade size in USDC
    #[serde(default = "default_min_trade_size")]
    pub min_trade_size: f64,
}

impl EvmSection {
    pub fn get_rpc_url(&self) -> String {
        std::env::var("EVM_RPC_URL").unwrap_or_else(|_| self.rpc_url.clone())
    }
}

/// TON configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct TonSection {
    /// toncenter-style RPC endpoint (TON_RPC_URL env var overrides)
    pub rpc_url: String,
    /// Swap gateway API base URL
    pub gateway_url: String,
    /// Minimum trade size in native TON
    #[serde(default = "default_min_trade_size")]
    pub min_trade_size: f64,
}

impl TonSection {
    pub fn get_rpc_url(&self) -> String {
        std::env::var("TON_RPC_URL").unwrap_or_else(|_| self.rpc_url.clone())
    }
}

fn default_request_timeout() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_min_trade_size() -> f64 {
    1.0
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor.interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "monitor.interval_secs must be > 0".to_string(),
            ));
        }

        if self.engine.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "engine.request_timeout_secs must be > 0".to_string(),
            ));
        }

        if self.engine.retry_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "engine.retry_attempts must be > 0".to_string(),
            ));
        }

        if self.storage.data_dir.is_empty() {
            return Err(ConfigError::ValidationError(
                "storage.data_dir cannot be empty".to_string(),
            ));
        }

        if self.solana.is_none() && self.evm.is_none() && self.ton.is_none() {
            return Err(ConfigError::ValidationError(
                "at least one chain section must be configured".to_string(),
            ));
        }

        if let Some(solana) = &self.solana {
            require(&solana.rpc_url, "solana.rpc_url")?;
            require(&solana.jupiter_api_url, "solana.jupiter_api_url")?;
            require(&solana.jupiter_price_url, "solana.jupiter_price_url")?;
            require(&solana.usdc_mint, "solana.usdc_mint")?;
            positive(solana.min_trade_size, "solana.min_trade_size")?;
        }

        if let Some(evm) = &self.evm {
            require(&evm.rpc_url, "evm.rpc_url")?;
            require(&evm.aggregator_url, "evm.aggregator_url")?;
            require(&evm.usdc_address, "evm.usdc_address")?;
            require(&evm.router_address, "evm.router_address")?;
            if evm.chain_id == 0 {
                return Err(ConfigError::ValidationError(
                    "evm.chain_id must be > 0".to_string(),
                ));
            }
            positive(evm.min_trade_size, "evm.min_trade_size")?;
        }

        if let Some(ton) = &self.ton {
            require(&ton.rpc_url, "ton.rpc_url")?;
            require(&ton.gateway_url, "ton.gateway_url")?;
            positive(ton.min_trade_size, "ton.min_trade_size")?;
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.engine.retry_attempts, self.engine.retry_base_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.request_timeout_secs)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor.interval_secs)
    }

    pub fn solana_settings(&self) -> Option<SolanaSettings> {
        self.solana.as_ref().map(|s| SolanaSettings {
            rpc_url: s.get_rpc_url(),
            jupiter_api_url: s.jupiter_api_url.clone(),
            jupiter_price_url: s.jupiter_price_url.clone(),
            usdc_mint: s.usdc_mint.clone(),
            min_trade_size: s.min_trade_size,
            request_timeout: self.request_timeout(),
            retry: self.retry_policy(),
        })
    }

    pub fn evm_settings(&self) -> Option<EvmSettings> {
        self.evm.as_ref().map(|s| EvmSettings {
            rpc_url: s.get_rpc_url(),
            aggregator_url: s.aggregator_url.clone(),
            usdc_address: s.usdc_address.clone(),
            router_address: s.router_address.clone(),
            chain_id: s.chain_id,
            min_trade_size: s.min_trade_size,
            request_timeout: self.request_timeout(),
            retry: self.retry_policy(),
        })
    }

    pub fn ton_settings(&self) -> Option<TonSettings> {
        self.ton.as_ref().map(|s| TonSettings {
            rpc_url: s.get_rpc_url(),
            gateway_url: s.gateway_url.clone(),
            min_trade_size: s.min_trade_size,
            request_timeout: self.request_timeout(),
            retry: self.retry_policy(),
        })
    }
}

fn require(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "{field} cannot be empty"
        )));
    }
    Ok(())
}

fn positive(value: f64, field: &str) -> Result<(), ConfigError> {
    if value <= 0.0 || !value.is_finite() {
        return Err(ConfigError::ValidationError(format!(
            "{field} must be > 0, got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_toml() -> &'static str {
        r#"
            [engine]
            dry_run = false

            [monitor]
            interval_secs = 15

            [storage]
            data_dir = "~/.signal-herald"

            [logging]
            level = "info"

            [solana]
            rpc_url = "https://api.mainnet-beta.solana.com"
            jupiter_api_url = "https://quote-api.jup.ag/v6"
            jupiter_price_url = "https://price.jup.ag/v6/price"
            usdc_mint = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"
            min_trade_size = 5.0
        "#
    }

    #[test]
    fn test_parse_and_validate() {
        let config: Config = toml::from_str(sample_toml()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.monitor.interval_secs, 15);
        assert!(!config.engine.dry_run);
        assert!(config.solana.is_some());
        assert!(config.evm.is_none());
        // Defaults kick in for omitted engine fields.
        assert_eq!(config.engine.retry_attempts, 3);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let toml_str = sample_toml().replace("interval_secs = 15", "interval_secs = 0");
        let config: Config = toml::from_str(&toml_str).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_no_chain_section_rejected() {
        let toml_str = r#"
            [engine]
            [monitor]
            interval_secs = 15
            [storage]
            data_dir = "/tmp/x"
            [logging]
            level = "info"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_data_dir_tilde_expands() {
        let config: Config = toml::from_str(sample_toml()).unwrap();
        let dir = config.storage.data_dir();
        assert!(!dir.to_string_lossy().contains('~'));
    }
}
