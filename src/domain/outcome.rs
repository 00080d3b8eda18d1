//! Per-user dispatch outcomes.
//!
//! Every fan-out unit resolves to exactly one of these; errors never escape
//! a unit as anything else. Reason codes are deliberately coarse - they are
//! what the command layer shows end users.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No wallet registered for the signal's chain family.
    NoWallet,
    /// User already holds their configured maximum of open positions.
    MaxPositions,
    /// Sized trade fell below the chain's minimum tradable unit.
    InsufficientFunds,
    /// Spot engine is long-only; sell-side signals are not executed.
    UnsupportedSide,
    InsufficientLiquidity,
    SlippageExceeded,
    /// Credential could not sign - configuration problem, never retried.
    Signature,
    /// Transient RPC failure that survived the adapter's retry budget.
    Network,
    /// Generic terminal submission failure.
    Order,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::NoWallet => "no_wallet",
            SkipReason::MaxPositions => "max_positions",
            SkipReason::InsufficientFunds => "insufficient_funds",
            SkipReason::UnsupportedSide => "unsupported_side",
            SkipReason::InsufficientLiquidity => "insufficient_liquidity",
            SkipReason::SlippageExceeded => "slippage_exceeded",
            SkipReason::Signature => "signature",
            SkipReason::Network => "network",
            SkipReason::Order => "order",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DispatchOutcome {
    Opened { position_id: u64 },
    Simulated { position_id: u64 },
    Skipped { reason: SkipReason },
}

/// One user's result for one signal delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserOutcome {
    pub user_id: u64,
    pub outcome: DispatchOutcome,
}

impl UserOutcome {
    pub fn opened(user_id: u64, position_id: u64) -> Self {
        Self { user_id, outcome: DispatchOutcome::Opened { position_id } }
    }

    pub fn simulated(user_id: u64, position_id: u64) -> Self {
        Self { user_id, outcome: DispatchOutcome::Simulated { position_id } }
    }

    pub fn skipped(user_id: u64, reason: SkipReason) -> Self {
        Self { user_id, outcome: DispatchOutcome::Skipped { reason } }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self.outcome, DispatchOutcome::Skipped { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let opened = UserOutcome::opened(1, 42);
        assert_eq!(opened.outcome, DispatchOutcome::Opened { position_id: 42 });
        assert!(!opened.is_skip());

        let skipped = UserOutcome::skipped(2, SkipReason::MaxPositions);
        assert!(skipped.is_skip());
    }

    #[test]
    fn test_reason_codes_are_coarse() {
        assert_eq!(SkipReason::InsufficientFunds.to_string(), "insufficient_funds");
        assert_eq!(SkipReason::NoWallet.to_string(), "no_wallet");
    }
}
