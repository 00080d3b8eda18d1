//! Position lifecycle: Open -> {ClosedTp, ClosedSl, ClosedError}.
//!
//! Positions are created by the dispatcher on a successful (or simulated)
//! entry and mutated only by the monitor afterwards. Closed positions are
//! never deleted; they feed per-user stats.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::signal::{ChainFamily, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    ClosedTp,
    ClosedSl,
    ClosedError,
}

impl PositionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PositionStatus::Open)
    }
}

#[derive(Debug, Error)]
pub enum PositionError {
    #[error("Invalid entry price: {0}")]
    InvalidEntryPrice(f64),
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(f64),
    #[error("Stop-loss {sl} and take-profit {tp} must bracket entry {entry}")]
    InvalidTargets { entry: f64, sl: f64, tp: f64 },
    #[error("Position {0} is already closed")]
    AlreadyClosed(u64),
    #[error("Close requires a terminal status")]
    NotTerminal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: u64,
    pub user_id: u64,
    pub chain: ChainFamily,
    pub asset: String,
    pub pair: String,
    pub side: Side,
    pub entry_price: f64,
    /// Tokens held, in UI units.
    pub quantity: f64,
    /// Quote currency spent to enter.
    pub entry_spent: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub status: PositionStatus,
    /// True when the entry was simulated (per-user or global dry-run).
    pub simulated: bool,
    pub entry_tx: Option<String>,
    pub exit_tx: Option<String>,
    pub exit_price: Option<f64>,
    pub pnl: Option<f64>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Position {
    /// Create an open position. `id` is assigned by the ledger on record.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        user_id: u64,
        chain: ChainFamily,
        asset: impl Into<String>,
        pair: impl Into<String>,
        side: Side,
        entry_price: f64,
        quantity: f64,
        entry_spent: f64,
        stop_loss: f64,
        take_profit: f64,
        simulated: bool,
        entry_tx: Option<String>,
    ) -> Result<Self, PositionError> {
        if entry_price <= 0.0 || !entry_price.is_finite() {
            return Err(PositionError::InvalidEntryPrice(entry_price));
        }
        if quantity <= 0.0 || !quantity.is_finite() {
            return Err(PositionError::InvalidQuantity(quantity));
        }
        // Long entries must sit between SL and TP.
        if !(stop_loss < entry_price && entry_price < take_profit) {
            return Err(PositionError::InvalidTargets {
                entry: entry_price,
                sl: stop_loss,
                tp: take_profit,
            });
        }

        Ok(Self {
            id: 0,
            user_id,
            chain,
            asset: asset.into(),
            pair: pair.into(),
            side,
            entry_price,
            quantity,
            entry_spent,
            stop_loss,
            take_profit,
            status: PositionStatus::Open,
            simulated,
            entry_tx,
            exit_tx: None,
            exit_price: None,
            pnl: None,
            opened_at: Utc::now(),
            closed_at: None,
        })
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// PnL in quote currency for a hypothetical exit price.
    pub fn pnl_at(&self, exit_price: f64) -> f64 {
        (exit_price - self.entry_price) * self.quantity
    }

    /// Transition into a terminal state. Terminal states are final.
    pub fn close(
        &mut self,
        status: PositionStatus,
        exit_price: Option<f64>,
        exit_tx: Option<String>,
    ) -> Result<(), PositionError> {
        if self.status.is_terminal() {
            return Err(PositionError::AlreadyClosed(self.id));
        }
        if !status.is_terminal() {
            return Err(PositionError::NotTerminal);
        }
        self.status = status;
        self.exit_price = exit_price;
        self.exit_tx = exit_tx;
        self.pnl = exit_price.map(|p| self.pnl_at(p));
        self.closed_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_position() -> Position {
        Position::open(
            1,
            ChainFamily::Evm,
            "0xtoken",
            "X/USDT",
            Side::Buy,
            100.0,
            5.0,
            500.0,
            90.0,
            120.0,
            false,
            Some("0xdeadbeef".to_string()),
        )
        .unwrap()
    }

    #[test]
    fn test_open_position() {
        let position = sample_position();
        assert!(position.is_open());
        assert_eq!(position.status, PositionStatus::Open);
        assert_eq!(position.entry_tx.as_deref(), Some("0xdeadbeef"));
    }

    #[test]
    fn test_invalid_entry_price() {
        let result = Position::open(
            1, ChainFamily::Evm, "0xtoken", "X/USDT", Side::Buy,
            0.0, 5.0, 0.0, 90.0, 120.0, false, None,
        );
        assert!(matches!(result, Err(PositionError::InvalidEntryPrice(_))));
    }

    #[test]
    fn test_targets_must_bracket_entry() {
        let result = Position::open(
            1, ChainFamily::Evm, "0xtoken", "X/USDT", Side::Buy,
            100.0, 5.0, 500.0, 110.0, 120.0, false, None,
        );
        assert!(matches!(result, Err(PositionError::InvalidTargets { .. })));
    }

    #[test]
    fn test_pnl_at() {
        let position = sample_position();
        assert_relative_eq!(position.pnl_at(120.0), 100.0);
        assert_relative_eq!(position.pnl_at(90.0), -50.0);
    }

    #[test]
    fn test_close_take_profit() {
        let mut position = sample_position();
        position
            .close(PositionStatus::ClosedTp, Some(121.0), Some("0xexit".to_string()))
            .unwrap();
        assert_eq!(position.status, PositionStatus::ClosedTp);
        assert_relative_eq!(position.pnl.unwrap(), 105.0);
        assert!(position.closed_at.is_some());
    }

    #[test]
    fn test_terminal_state_is_final() {
        let mut position = sample_position();
        position.close(PositionStatus::ClosedSl, Some(89.0), None).unwrap();
        let result = position.close(PositionStatus::ClosedTp, Some(121.0), None);
        assert!(matches!(result, Err(PositionError::AlreadyClosed(_))));
    }

    #[test]
    fn test_close_rejects_open_status() {
        let mut position = sample_position();
        let result = position.close(PositionStatus::Open, None, None);
        assert!(matches!(result, Err(PositionError::NotTerminal)));
    }

    #[test]
    fn test_close_without_price_leaves_pnl_unset() {
        let mut position = sample_position();
        position.close(PositionStatus::ClosedError, None, None).unwrap();
        assert!(position.pnl.is_none());
        assert_eq!(position.status, PositionStatus::ClosedError);
    }
}
