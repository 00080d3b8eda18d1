//! Per-user profiles: capital rule, risk limits, auto-trade flag and
//! cumulative trading stats.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::position::PositionStatus;

#[derive(Debug, Error)]
pub enum UserError {
    #[error("Capital percentage must be in (0, 100], got {0}")]
    InvalidCapitalPct(f64),
    #[error("Max positions must be >= 1, got {0}")]
    InvalidMaxPositions(u32),
    #[error("Slippage must be 1-5000 bps, got {0}")]
    InvalidSlippage(u16),
    #[error("Risk percentage must be in (0, 100), got {0}")]
    InvalidRiskPct(f64),
}

/// Cumulative trading results, updated only when a position closes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TradeStats {
    pub trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub pnl: f64,
}

impl TradeStats {
    /// Fold one closed position into the stats. Error closes count as a
    /// trade but as neither win nor loss, and carry whatever PnL (if any)
    /// was realized before the exit failed.
    pub fn record_close(&mut self, status: PositionStatus, pnl: Option<f64>) {
        self.trades += 1;
        match status {
            PositionStatus::ClosedTp => self.wins += 1,
            PositionStatus::ClosedSl => self.losses += 1,
            PositionStatus::ClosedError | PositionStatus::Open => {}
        }
        if let Some(pnl) = pnl {
            self.pnl += pnl;
        }
    }

    pub fn win_rate(&self) -> f64 {
        let decided = self.wins + self.losses;
        if decided == 0 {
            0.0
        } else {
            self.wins as f64 / decided as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: u64,
    pub username: Option<String>,
    /// Share of the wallet's quote balance committed per trade, 0 < p <= 100.
    pub capital_pct: f64,
    /// Maximum concurrently open positions, >= 1.
    pub max_positions: u32,
    pub slippage_bps: u16,
    /// Stop-loss distance below entry, percent.
    pub stop_loss_pct: f64,
    /// Take-profit distance above entry, percent.
    pub take_profit_pct: f64,
    pub auto_trade: bool,
    pub dry_run: bool,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub stats: TradeStats,
}

impl UserProfile {
    pub fn new(user_id: u64, username: Option<String>, is_admin: bool) -> Self {
        Self {
            user_id,
            username,
            capital_pct: 5.0,
            max_positions: 1,
            slippage_bps: 100,
            stop_loss_pct: 10.0,
            take_profit_pct: 20.0,
            auto_trade: true,
            dry_run: false,
            is_admin,
            created_at: Utc::now(),
            stats: TradeStats::default(),
        }
    }

    pub fn set_capital_pct(&mut self, pct: f64) -> Result<(), UserError> {
        if pct <= 0.0 || pct > 100.0 || !pct.is_finite() {
            return Err(UserError::InvalidCapitalPct(pct));
        }
        self.capital_pct = pct;
        Ok(())
    }

    pub fn set_max_positions(&mut self, max: u32) -> Result<(), UserError> {
        if max == 0 {
            return Err(UserError::InvalidMaxPositions(max));
        }
        self.max_positions = max;
        Ok(())
    }

    pub fn set_slippage_bps(&mut self, bps: u16) -> Result<(), UserError> {
        if bps == 0 || bps > 5000 {
            return Err(UserError::InvalidSlippage(bps));
        }
        self.slippage_bps = bps;
        Ok(())
    }

    pub fn set_stop_loss_pct(&mut self, pct: f64) -> Result<(), UserError> {
        if pct <= 0.0 || pct >= 100.0 || !pct.is_finite() {
            return Err(UserError::InvalidRiskPct(pct));
        }
        self.stop_loss_pct = pct;
        Ok(())
    }

    pub fn set_take_profit_pct(&mut self, pct: f64) -> Result<(), UserError> {
        if pct <= 0.0 || !pct.is_finite() {
            return Err(UserError::InvalidRiskPct(pct));
        }
        self.take_profit_pct = pct;
        Ok(())
    }

    /// SL/TP price targets for a long entry at `entry_price`.
    pub fn risk_targets(&self, entry_price: f64) -> (f64, f64) {
        let stop_loss = entry_price * (1.0 - self.stop_loss_pct / 100.0);
        let take_profit = entry_price * (1.0 + self.take_profit_pct / 100.0);
        (stop_loss, take_profit)
    }
}
