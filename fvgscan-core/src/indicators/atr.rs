//! Average True Range (ATR).
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|)
//! ATR is the simple rolling mean of the last `period` true ranges.

use crate::domain::Candle;

/// Compute the True Range series from candles.
/// TR[0] = high[0] - low[0] (no previous close).
/// TR[t] = max(high[t]-low[t], |high[t]-close[t-1]|, |low[t]-close[t-1]|).
pub fn true_range(candles: &[Candle]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(candles.len());
    for (i, c) in candles.iter().enumerate() {
        let range = c.high - c.low;
        let value = match i.checked_sub(1).map(|p| candles[p].close) {
            Some(pc) => range.max((c.high - pc).abs()).max((c.low - pc).abs()),
            None => range,
        };
        tr.push(value);
    }
    tr
}

/// Rolling-mean ATR series. Entries before `period - 1` are NaN.
pub fn atr_series(candles: &[Candle], period: usize) -> Vec<f64> {
    let tr = true_range(candles);
    let mut out = vec![f64::NAN; tr.len()];
    if period == 0 || tr.len() < period {
        return out;
    }
    let mut window_sum: f64 = tr[..period].iter().sum();
    out[period - 1] = window_sum / period as f64;
    for i in period..tr.len() {
        window_sum += tr[i] - tr[i - period];
        out[i] = window_sum / period as f64;
    }
    out
}

/// ATR as of the last candle in `candles`, or None when there are fewer than
/// `period` candles or the value is not finite.
pub fn latest_atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period {
        return None;
    }
    // One extra candle supplies the previous close for the first TR in the window.
    let start = candles.len().saturating_sub(period + 1);
    let tr = true_range(&candles[start..]);
    let mean = tr[tr.len() - period..].iter().sum::<f64>() / period as f64;
    mean.is_finite().then_some(mean)
}
