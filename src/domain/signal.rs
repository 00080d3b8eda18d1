//! Trade signals and chain taxonomy.
//!
//! A `Signal` is the structured trade intent handed over by the message
//! parsing layer. The engine never sees raw chat text; by the time a value
//! reaches the dispatcher it is already validated and immutable.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The three mutually incompatible execution/signing models we support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    Solana,
    Evm,
    Ton,
}

impl ChainFamily {
    pub const ALL: [ChainFamily; 3] = [ChainFamily::Solana, ChainFamily::Evm, ChainFamily::Ton];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChainFamily::Solana => "solana",
            ChainFamily::Evm => "evm",
            ChainFamily::Ton => "ton",
        }
    }
}

impl fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown chain family: {0}")]
pub struct ParseChainError(String);

impl FromStr for ChainFamily {
    type Err = ParseChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "solana" | "sol" => Ok(ChainFamily::Solana),
            "evm" | "ethereum" | "eth" => Ok(ChainFamily::Evm),
            "ton" => Ok(ChainFamily::Ton),
            other => Err(ParseChainError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("Asset identifier cannot be empty")]
    EmptyAsset,
    #[error("Price hint must be positive, got {0}")]
    InvalidPriceHint(f64),
}

/// Structured trade intent derived from one posted message.
///
/// Consumed exactly once by the dispatcher. Delivering the same signal twice
/// is two independent dispatch cycles; no deduplication happens here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// Token contract address (mint on Solana, ERC-20 on EVM, jetton on TON).
    pub asset: String,
    /// Human-readable pair symbol, for logs and stats display only.
    pub pair: String,
    pub chain: ChainFamily,
    pub side: Side,
    /// Price the signal author quoted, if any. Used as a fill sanity check.
    #[serde(default)]
    pub price_hint: Option<f64>,
    pub received_at: DateTime<Utc>,
}

impl Signal {
    pub fn new(
        asset: impl Into<String>,
        pair: impl Into<String>,
        chain: ChainFamily,
        side: Side,
        price_hint: Option<f64>,
    ) -> Result<Self, SignalError> {
        let asset = asset.into();
        if asset.trim().is_empty() {
            return Err(SignalError::EmptyAsset);
        }
        if let Some(hint) = price_hint {
            if hint <= 0.0 || !hint.is_finite() {
                return Err(SignalError::InvalidPriceHint(hint));
            }
        }
        Ok(Self {
            asset,
            pair: pair.into(),
            chain,
            side,
            price_hint,
            received_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_signal() {
        let signal = Signal::new(
            "So11111111111111111111111111111111111111112",
            "SOL/USDC",
            ChainFamily::Solana,
            Side::Buy,
            Some(150.0),
        )
        .unwrap();
        assert_eq!(signal.chain, ChainFamily::Solana);
        assert_eq!(signal.side, Side::Buy);
        assert_eq!(signal.price_hint, Some(150.0));
    }

    #[test]
    fn test_empty_asset_rejected() {
        let result = Signal::new("  ", "X/USDC", ChainFamily::Evm, Side::Buy, None);
        assert!(matches!(result, Err(SignalError::EmptyAsset)));
    }

    #[test]
    fn test_negative_price_hint_rejected() {
        let result = Signal::new("0xabc", "X/USDC", ChainFamily::Evm, Side::Buy, Some(-1.0));
        assert!(matches!(result, Err(SignalError::InvalidPriceHint(_))));
    }

    #[test]
    fn test_chain_family_round_trip() {
        for chain in ChainFamily::ALL {
            let parsed: ChainFamily = chain.as_str().parse().unwrap();
            assert_eq!(parsed, chain);
        }
        assert!("near".parse::<ChainFamily>().is_err());
    }

    #[test]
    fn test_chain_family_aliases() {
        assert_eq!("ethereum".parse::<ChainFamily>().unwrap(), ChainFamily::Evm);
        assert_eq!("SOL".parse::<ChainFamily>().unwrap(), ChainFamily::Solana);
    }
}
