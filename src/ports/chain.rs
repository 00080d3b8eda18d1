//! ChainAdapter - the uniform trade contract every chain family implements.
//!
//! The dispatcher and monitor only ever talk to this trait; everything
//! chain-specific (RPC shapes, DEX routing, retry policy for transient RPC
//! errors) lives behind it in the adapter implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::outcome::SkipReason;
use crate::domain::position::Position;
use crate::domain::signal::{ChainFamily, Side};
use crate::vault::ChainSigner;

#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    /// Transient RPC/HTTP failure. The only retryable kind.
    #[error("Network error: {0}")]
    Network(String),
    #[error("Insufficient liquidity: {0}")]
    InsufficientLiquidity(String),
    #[error("Slippage tolerance exceeded")]
    SlippageExceeded,
    /// Signing failed or the signer does not match this chain family.
    #[error("Signature error: {0}")]
    Signature(String),
    /// Generic terminal submission failure.
    #[error("Order failed: {0}")]
    Order(String),
}

impl AdapterError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AdapterError::Network(_))
    }

    /// Coarse reason code surfaced to users when this error ends a fan-out
    /// unit.
    pub fn skip_reason(&self) -> SkipReason {
        match self {
            AdapterError::Network(_) => SkipReason::Network,
            AdapterError::InsufficientLiquidity(_) => SkipReason::InsufficientLiquidity,
            AdapterError::SlippageExceeded => SkipReason::SlippageExceeded,
            AdapterError::Signature(_) => SkipReason::Signature,
            AdapterError::Order(_) => SkipReason::Order,
        }
    }
}

/// Result of a filled entry order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFill {
    pub tx_id: String,
    pub executed_price: f64,
    /// Tokens received, in UI units.
    pub executed_quantity: f64,
}

/// Result of a filled exit order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitFill {
    pub tx_id: String,
    pub executed_price: f64,
}

/// Capability set {balance, price, order, exit} over one chain family.
///
/// Implementations own their retry policy: transient network errors are
/// retried with bounded backoff inside the adapter; signature and liquidity
/// errors are terminal for the attempt and must never be retried. Every
/// call is bounded by the underlying HTTP client timeout and surfaces
/// `AdapterError::Network` instead of hanging.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn family(&self) -> ChainFamily;

    /// Minimum tradable size in quote-currency units. Sized trades below
    /// this are rejected before any submission.
    fn min_trade_size(&self) -> f64;

    /// Quote-currency balance available to the wallet. Fails loudly on RPC
    /// errors; never silently returns zero.
    async fn available_balance(&self, wallet: &str) -> Result<f64, AdapterError>;

    /// Spot price of the asset in quote currency.
    async fn spot_price(&self, asset: &str) -> Result<f64, AdapterError>;

    /// Build, sign and submit an entry swap.
    async fn submit_order(
        &self,
        signer: &ChainSigner,
        asset: &str,
        side: Side,
        size: f64,
        slippage_bps: u16,
    ) -> Result<OrderFill, AdapterError>;

    /// Mirror of `submit_order` for closing an open position.
    async fn submit_exit(
        &self,
        signer: &ChainSigner,
        position: &Position,
        slippage_bps: u16,
    ) -> Result<ExitFill, AdapterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_network_is_transient() {
        assert!(AdapterError::Network("timeout".into()).is_transient());
        assert!(!AdapterError::SlippageExceeded.is_transient());
        assert!(!AdapterError::Signature("bad key".into()).is_transient());
        assert!(!AdapterError::InsufficientLiquidity("thin book".into()).is_transient());
        assert!(!AdapterError::Order("reverted".into()).is_transient());
    }

    #[test]
    fn test_skip_reason_mapping() {
        assert_eq!(
            AdapterError::SlippageExceeded.skip_reason(),
            SkipReason::SlippageExceeded
        );
        assert_eq!(
            AdapterError::Signature("x".into()).skip_reason(),
            SkipReason::Signature
        );
    }
}
