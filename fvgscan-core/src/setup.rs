//! Trade setup derivation.
//!
//! # Formula
//! ```text
//! entry         = close at signal formation
//! stop_distance = ATR(atr_period) * stop_loss_atr_multiplier
//! stop_loss     = entry -/+ stop_distance      (bullish / bearish)
//! take_profit   = entry +/- stop_distance * take_profit_rr_ratio
//! position_size = equity * max_risk_percent / 100 / stop_distance
//! ```

use crate::confluence::Signal;
use crate::domain::{Candle, Direction, SignalId};
use crate::indicators::latest_atr;
use crate::params::ParameterSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SetupError {
    /// ATR missing or non-finite, or a stop distance that is not positive.
    #[error("{symbol}: insufficient range for a stop (distance {stop_distance})")]
    InsufficientRange { symbol: String, stop_distance: f64 },

    #[error("{symbol}: account equity must be positive, got {equity}")]
    InvalidEquity { symbol: String, equity: f64 },
}

/// Current account equity for sizing.
pub trait EquityProvider {
    fn get_equity(&self) -> f64;
}

/// Constant equity, for scans and tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedEquity(pub f64);

impl EquityProvider for FixedEquity {
    fn get_equity(&self) -> f64 {
        self.0
    }
}

/// Market state at the signal's close time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandleContext {
    pub close: f64,
    pub atr: Option<f64>,
}

impl CandleContext {
    /// Build from the candles closed at signal time, newest last.
    pub fn from_candles(candles: &[Candle], atr_period: usize) -> Option<Self> {
        let last = candles.last()?;
        Some(Self {
            close: last.close,
            atr: latest_atr(candles, atr_period),
        })
    }
}

/// Concrete entry, stop and target for a signal. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setup {
    pub signal_id: SignalId,
    pub symbol: String,
    pub direction: Direction,
    pub created_at: DateTime<Utc>,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub risk_percent: f64,
    pub position_size: f64,
    /// Reward distance over risk distance as placed.
    pub risk_reward: f64,
    pub atr: f64,
}

impl Setup {
    pub fn stop_distance(&self) -> f64 {
        (self.entry - self.stop_loss).abs()
    }

    /// Account currency lost if the stop is hit at the stop price.
    pub fn risk_amount(&self) -> f64 {
        self.stop_distance() * self.position_size
    }
}

/// Derive a setup from `signal`. No setup is produced on error.
pub fn generate(
    signal: &Signal,
    context: &CandleContext,
    params: &ParameterSet,
    equity: &dyn EquityProvider,
) -> Result<Setup, SetupError> {
    let insufficient = |stop_distance: f64| SetupError::InsufficientRange {
        symbol: signal.symbol.clone(),
        stop_distance,
    };

    let atr = context.atr.ok_or_else(|| insufficient(f64::NAN))?;
    let stop_distance = atr * params.stop_loss_atr_multiplier;
    if !stop_distance.is_finite() || stop_distance <= 0.0 || !context.close.is_finite() {
        return Err(insufficient(stop_distance));
    }

    let equity = equity.get_equity();
    if !equity.is_finite() || equity <= 0.0 {
        return Err(SetupError::InvalidEquity {
            symbol: signal.symbol.clone(),
            equity,
        });
    }

    let entry = context.close;
    let sign = signal.direction.sign();
    let stop_loss = entry - sign * stop_distance;
    let take_profit = entry + sign * stop_distance * params.take_profit_rr_ratio;
    if stop_loss <= 0.0 {
        return Err(insufficient(stop_distance));
    }

    let risk_dollars = equity * params.max_risk_percent / 100.0;
    let position_size = risk_dollars / stop_distance;
    let risk_reward = (take_profit - entry).abs() / (entry - stop_loss).abs();

    Ok(Setup {
        signal_id: signal.id.clone(),
        symbol: signal.symbol.clone(),
        direction: signal.direction,
        created_at: signal.formed_at,
        entry,
        stop_loss,
        take_profit,
        risk_percent: params.max_risk_percent,
        position_size,
        risk_reward,
        atr,
    })
}
