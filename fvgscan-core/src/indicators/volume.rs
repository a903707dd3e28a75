//! Volume baseline used by gap confirmation.

use crate::domain::Candle;

/// Candles averaged for the volume baseline.
pub const VOLUME_LOOKBACK: usize = 20;

/// Mean volume of up to `lookback` candles strictly before `index`.
/// None when `index` is 0 (no history).
pub fn average_volume_before(candles: &[Candle], index: usize, lookback: usize) -> Option<f64> {
    let end = index.min(candles.len());
    let start = end.saturating_sub(lookback);
    let window = &candles[start..end];
    if window.is_empty() {
        return None;
    }
    Some(window.iter().map(|c| c.volume).sum::<f64>() / window.len() as f64)
}
