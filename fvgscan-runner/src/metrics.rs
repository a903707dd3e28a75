//! Performance metrics: pure functions that compute backtest statistics.
//!
//! Every metric is a pure function: closed positions in, scalar out.
//! No dependencies on the simulator, data source, or runner.

use serde::{Deserialize, Serialize};

use crate::position::Position;

/// Default annualization constant for the per-trade Sharpe ratio.
pub const DEFAULT_ANNUALIZATION: f64 = 252.0;

/// Aggregate performance metrics for a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub trade_count: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    /// Total P&L as a percent of initial capital.
    pub total_return_pct: f64,
    /// Largest peak-to-trough decline of cumulative P&L, in account currency.
    pub max_drawdown: f64,
    /// `None` with fewer than two trades or zero return variance.
    pub sharpe: Option<f64>,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub max_consecutive_losses: usize,
    pub final_equity: f64,
}

impl PerformanceMetrics {
    /// Compute all metrics from the closed positions in exit order.
    pub fn compute(positions: &[Position], initial_capital: f64, annualization: f64) -> Self {
        let pnls: Vec<f64> = positions.iter().map(|p| p.pnl).collect();
        let returns: Vec<f64> = positions.iter().map(|p| p.return_pct).collect();
        let total = total_pnl(&pnls);
        Self {
            trade_count: positions.len(),
            winning_trades: pnls.iter().filter(|&&p| p > 0.0).count(),
            losing_trades: pnls.iter().filter(|&&p| p <= 0.0).count(),
            win_rate: win_rate(&pnls),
            total_pnl: total,
            total_return_pct: if initial_capital > 0.0 {
                total / initial_capital * 100.0
            } else {
                0.0
            },
            max_drawdown: max_drawdown(&pnls),
            sharpe: sharpe_ratio(&returns, annualization),
            profit_factor: profit_factor(&pnls),
            avg_win: mean_f64(&pnls.iter().copied().filter(|&p| p > 0.0).collect::<Vec<_>>()),
            avg_loss: mean_f64(&pnls.iter().copied().filter(|&p| p <= 0.0).collect::<Vec<_>>()),
            largest_win: pnls.iter().copied().fold(0.0, f64::max),
            largest_loss: pnls.iter().copied().fold(0.0, f64::min),
            max_consecutive_losses: max_consecutive_losses(&pnls),
            final_equity: initial_capital + total,
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

pub fn total_pnl(pnls: &[f64]) -> f64 {
    pnls.iter().sum()
}

/// Win rate: fraction of closed trades with positive P&L.
pub fn win_rate(pnls: &[f64]) -> f64 {
    if pnls.is_empty() {
        return 0.0;
    }
    let winners = pnls.iter().filter(|&&p| p > 0.0).count();
    winners as f64 / pnls.len() as f64
}

/// Largest peak-to-trough decline of the cumulative P&L curve, starting at 0.
///
/// Returned as a non-negative amount in account currency.
pub fn max_drawdown(pnls: &[f64]) -> f64 {
    let mut cumulative = 0.0_f64;
    let mut peak = 0.0_f64;
    let mut max_dd = 0.0_f64;
    for &p in pnls {
        cumulative += p;
        peak = peak.max(cumulative);
        max_dd = max_dd.max(peak - cumulative);
    }
    max_dd
}

/// Annualized Sharpe ratio of per-trade returns.
///
/// Sharpe = mean(returns) / std(returns) * sqrt(annualization).
/// Returns None for fewer than 2 trades or zero variance.
pub fn sharpe_ratio(returns: &[f64], annualization: f64) -> Option<f64> {
    if returns.len() < 2 {
        return None;
    }
    let mean = mean_f64(returns);
    let std = std_dev(returns);
    if std < 1e-15 {
        return None;
    }
    Some(mean / std * annualization.sqrt())
}

/// Profit factor: gross profits / gross losses.
///
/// Capped at 100.0 for edge cases (all winners, zero losses).
pub fn profit_factor(pnls: &[f64]) -> f64 {
    if pnls.is_empty() {
        return 0.0;
    }
    let gross_profit: f64 = pnls.iter().filter(|&&p| p > 0.0).sum();
    let gross_loss: f64 = pnls.iter().filter(|&&p| p < 0.0).map(|p| p.abs()).sum();

    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { 100.0 } else { 0.0 };
    }
    (gross_profit / gross_loss).min(100.0)
}

/// Maximum run of consecutive non-winning trades.
pub fn max_consecutive_losses(pnls: &[f64]) -> usize {
    let mut max_streak = 0;
    let mut current = 0;
    for &p in pnls {
        if p <= 0.0 {
            current += 1;
            max_streak = max_streak.max(current);
        } else {
            current = 0;
        }
    }
    max_streak
}

// ─── Helpers ────────────────────────────────────────────────────────

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::ExitReason;
    use chrono::{TimeZone, Utc};
    use fvgscan_core::domain::{Direction, SignalId};

    fn make_position(pnl: f64) -> Position {
        let t = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        Position {
            symbol: "BTC/USDT".into(),
            direction: Direction::Bullish,
            signal_id: SignalId::from_bytes(b"s"),
            entry_time: t,
            entry_price: 100.0,
            stop_loss: 97.0,
            take_profit: 106.0,
            size: 10.0,
            exit_time: t,
            exit_price: 100.0 + pnl / 10.0,
            exit_reason: if pnl > 0.0 {
                ExitReason::TakeProfit
            } else {
                ExitReason::StopLoss
            },
            pnl,
            return_pct: pnl / 10_000.0,
            equity_at_entry: 10_000.0,
            bars_held: 5,
        }
    }

    // ── Win rate ──

    #[test]
    fn win_rate_counts_positive_pnl() {
        assert_eq!(win_rate(&[60.0, -30.0, 60.0, -30.0]), 0.5);
        assert_eq!(win_rate(&[]), 0.0);
        assert_eq!(win_rate(&[0.0]), 0.0);
    }

    // ── Drawdown ──

    #[test]
    fn drawdown_on_cumulative_pnl() {
        // Curve: 100, 50, 80, -20, 30 → peak 100, trough -20.
        assert_eq!(max_drawdown(&[100.0, -50.0, 30.0, -100.0, 50.0]), 120.0);
    }

    #[test]
    fn drawdown_from_zero_baseline() {
        // Curve: -30, -60 → decline from the initial 0.
        assert_eq!(max_drawdown(&[-30.0, -30.0]), 60.0);
        assert_eq!(max_drawdown(&[10.0, 20.0]), 0.0);
    }

    // ── Sharpe ──

    #[test]
    fn sharpe_null_below_two_trades() {
        assert_eq!(sharpe_ratio(&[], 252.0), None);
        assert_eq!(sharpe_ratio(&[0.01], 252.0), None);
    }

    #[test]
    fn sharpe_null_for_constant_returns() {
        assert_eq!(sharpe_ratio(&[0.01, 0.01, 0.01], 252.0), None);
    }

    #[test]
    fn sharpe_annualizes_with_sqrt() {
        let returns = [0.02, -0.01, 0.03, -0.01];
        let mean = 0.0075;
        let std = std_dev(&returns);
        let expected = mean / std * 252.0_f64.sqrt();
        let got = sharpe_ratio(&returns, 252.0).unwrap();
        assert!((got - expected).abs() < 1e-12);
    }

    // ── Profit factor ──

    #[test]
    fn profit_factor_basic_and_capped() {
        assert_eq!(profit_factor(&[60.0, -30.0]), 2.0);
        assert_eq!(profit_factor(&[60.0]), 100.0);
        assert_eq!(profit_factor(&[-60.0]), 0.0);
    }

    // ── Aggregate ──

    #[test]
    fn compute_aggregates_positions() {
        let positions: Vec<Position> = [60.0, -30.0, -30.0, 60.0]
            .iter()
            .map(|&p| make_position(p))
            .collect();
        let m = PerformanceMetrics::compute(&positions, 10_000.0, DEFAULT_ANNUALIZATION);
        assert_eq!(m.trade_count, 4);
        assert_eq!(m.winning_trades, 2);
        assert_eq!(m.losing_trades, 2);
        assert_eq!(m.win_rate, 0.5);
        assert_eq!(m.total_pnl, 60.0);
        assert!((m.total_return_pct - 0.6).abs() < 1e-12);
        assert_eq!(m.max_drawdown, 60.0);
        assert_eq!(m.avg_win, 60.0);
        assert_eq!(m.avg_loss, -30.0);
        assert_eq!(m.largest_win, 60.0);
        assert_eq!(m.largest_loss, -30.0);
        assert_eq!(m.max_consecutive_losses, 2);
        assert_eq!(m.final_equity, 10_060.0);
        assert!(m.sharpe.is_some());
    }

    #[test]
    fn compute_empty() {
        let m = PerformanceMetrics::compute(&[], 10_000.0, DEFAULT_ANNUALIZATION);
        assert_eq!(m.trade_count, 0);
        assert_eq!(m.sharpe, None);
        assert_eq!(m.final_equity, 10_000.0);
    }
}
