//! Fair value gap detection.
//!
//! - `Gap`: one three-candle imbalance with its fill/age lifecycle
//! - `GapTracker`: incremental, append-only detector per (symbol, timeframe)
//! - `detect`: batch detection, defined as a replay through a fresh tracker
//!   so batch and incremental results cannot diverge

pub mod gap;
pub mod tracker;

pub use gap::{FillState, Gap};
pub use tracker::{GapTracker, PushOutcome, SequenceError, MIN_RETAINED_CANDLES};

use crate::domain::Candle;
use crate::params::ParameterSet;

/// Detect every gap in an ordered candle window for one (symbol, timeframe).
///
/// Gaps are returned in formation order with their fill/age state as of the
/// last candle. Fewer than three candles yields no gaps.
pub fn detect(candles: &[Candle], params: &ParameterSet) -> Result<Vec<Gap>, SequenceError> {
    let Some(first) = candles.first() else {
        return Ok(Vec::new());
    };
    let mut tracker = GapTracker::new(first.symbol.clone(), first.timeframe);
    for candle in candles {
        tracker.push(candle.clone(), params)?;
    }
    Ok(tracker.gaps().to_vec())
}
