//! Fair value gap record and its lifecycle rules.

use crate::domain::{Candle, Direction, GapId, Timeframe};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How far price has traded back into a gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillState {
    Open,
    PartiallyFilled,
    Filled,
}

/// A three-candle imbalance on one timeframe.
///
/// Bounds are `(lower, upper)`. For a bullish gap that is
/// `(high[i], low[i+2])`; for a bearish gap `(high[i+2], low[i])`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    pub id: GapId,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub direction: Direction,
    /// Index of the first candle of the triple within its partition.
    pub start_index: usize,
    pub upper: f64,
    pub lower: f64,
    /// `(upper - lower) / lower * 100`.
    pub size_percent: f64,
    /// Open time of the third candle.
    pub formed_at: DateTime<Utc>,
    /// Close time of the third candle; the gap is unknowable before this.
    pub confirmed_at: DateTime<Utc>,
    /// Candles seen since formation.
    pub age: usize,
    pub fill: FillState,
    pub expired: bool,
    /// `None` when volume confirmation is disabled.
    pub volume_confirmed: Option<bool>,
}

impl Gap {
    /// Evaluate the triple `(first, middle, third)` for an imbalance.
    ///
    /// Returns the direction and `(lower, upper)` bounds, or None.
    pub fn bounds(first: &Candle, third: &Candle) -> Option<(Direction, f64, f64)> {
        if first.high < third.low {
            Some((Direction::Bullish, first.high, third.low))
        } else if first.low > third.high {
            Some((Direction::Bearish, third.high, first.low))
        } else {
            None
        }
    }

    pub fn id_for(
        symbol: &str,
        timeframe: Timeframe,
        direction: Direction,
        formed_at: DateTime<Utc>,
    ) -> GapId {
        let key = format!(
            "{symbol}|{timeframe}|{direction}|{}",
            formed_at.timestamp_millis()
        );
        GapId::from_bytes(key.as_bytes())
    }

    /// Index of the third candle, the one that completes the pattern.
    pub fn formation_index(&self) -> usize {
        self.start_index + 2
    }

    pub fn midpoint(&self) -> f64 {
        (self.upper + self.lower) / 2.0
    }

    /// Open or partially filled, and not expired.
    pub fn is_active(&self) -> bool {
        !self.expired && self.fill != FillState::Filled
    }

    /// Advance the gap by one later candle.
    pub fn observe(&mut self, candle: &Candle, max_age: usize) {
        if !self.is_active() {
            return;
        }
        self.age += 1;
        if self.age > max_age {
            self.expired = true;
            return;
        }
        let (entered, traversed) = match self.direction {
            // Price sits above a bullish gap; it fills from above.
            Direction::Bullish => (candle.low < self.upper, candle.low <= self.lower),
            Direction::Bearish => (candle.high > self.lower, candle.high >= self.upper),
        };
        if traversed {
            self.fill = FillState::Filled;
        } else if entered {
            self.fill = FillState::PartiallyFilled;
        }
    }
}
