//! Missing-candle analysis.

use super::source::MissingRange;
use crate::domain::{Candle, Timeframe};
use chrono::{DateTime, Utc};
use tracing::warn;

/// Expected open times in `[start, end)` that have no candle, merged into
/// contiguous ranges. `candles` must be sorted by open time.
///
/// Markets are assumed continuous (24/7), so every timeframe boundary in the
/// window is expected.
pub fn find_missing_ranges(
    symbol: &str,
    timeframe: Timeframe,
    candles: &[Candle],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<MissingRange> {
    let step = timeframe.duration();
    let mut ranges: Vec<MissingRange> = Vec::new();
    let mut open: Option<(DateTime<Utc>, usize)> = None;
    let mut idx = 0;
    let mut t = timeframe.ceil(start);

    while t < end {
        while idx < candles.len() && candles[idx].open_time < t {
            idx += 1;
        }
        let present = idx < candles.len() && candles[idx].open_time == t;
        match (present, open.as_mut()) {
            (false, Some((_, count))) => *count += 1,
            (false, None) => open = Some((t, 1)),
            (true, Some(_)) => {
                if let Some((first, count)) = open.take() {
                    ranges.push(MissingRange {
                        symbol: symbol.to_string(),
                        timeframe,
                        start: first,
                        end: t,
                        missing_bars: count,
                    });
                }
            }
            (true, None) => {}
        }
        t += step;
    }
    if let Some((first, count)) = open {
        ranges.push(MissingRange {
            symbol: symbol.to_string(),
            timeframe,
            start: first,
            end: t,
            missing_bars: count,
        });
    }

    if !ranges.is_empty() {
        let missing: usize = ranges.iter().map(|r| r.missing_bars).sum();
        warn!(
            symbol,
            timeframe = %timeframe,
            ranges = ranges.len(),
            missing_bars = missing,
            "missing candles detected"
        );
    }
    ranges
}
