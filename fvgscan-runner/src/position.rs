//! Closed synthetic positions produced by the backtest simulator.

use chrono::{DateTime, Utc};
use fvgscan_core::domain::{Direction, SignalId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::StopLoss => f.write_str("stop_loss"),
            ExitReason::TakeProfit => f.write_str("take_profit"),
        }
    }
}

/// A completed round trip. Only closed positions are ever recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub direction: Direction,
    pub signal_id: SignalId,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub size: f64,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    pub exit_reason: ExitReason,
    /// Realized P&L in account currency.
    pub pnl: f64,
    /// `pnl / equity_at_entry`.
    pub return_pct: f64,
    pub equity_at_entry: f64,
    pub bars_held: usize,
}

impl Position {
    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }
}

/// Signed P&L of a round trip: positive when price moved in `direction`.
pub fn realized_pnl(direction: Direction, entry: f64, exit: f64, size: f64) -> f64 {
    (exit - entry) * size * direction.sign()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pnl_sign_follows_direction() {
        assert_eq!(realized_pnl(Direction::Bullish, 100.0, 106.0, 10.0), 60.0);
        assert_eq!(realized_pnl(Direction::Bullish, 100.0, 97.0, 10.0), -30.0);
        assert_eq!(realized_pnl(Direction::Bearish, 100.0, 94.0, 10.0), 60.0);
        assert_eq!(realized_pnl(Direction::Bearish, 100.0, 103.0, 10.0), -30.0);
    }
}
