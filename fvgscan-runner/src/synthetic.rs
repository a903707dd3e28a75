//! Deterministic synthetic candles for demos and tests.
//!
//! A random walk seeded from the BLAKE3 hash of the symbol, so the same
//! symbol always yields the same series. Occasional opening jumps leave
//! three-candle gaps for the detector to find. Clearly fake data.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use fvgscan_core::domain::{Candle, Timeframe};

/// Chance per bar of an opening jump.
const JUMP_PROBABILITY: f64 = 0.02;

/// Random-walk candles on `timeframe`, `bars` long, from `start` (floored).
pub fn generate_candles(
    symbol: &str,
    timeframe: Timeframe,
    start: DateTime<Utc>,
    bars: usize,
) -> Vec<Candle> {
    let seed_bytes = blake3::hash(symbol.as_bytes());
    let seed: [u8; 32] = *seed_bytes.as_bytes();
    let mut rng = StdRng::from_seed(seed);

    let step = timeframe.duration();
    let volatility = 0.002 * (timeframe.minutes() as f64).sqrt();
    let mut candles = Vec::with_capacity(bars);
    let mut price = 100.0_f64;
    let mut open_time = timeframe.floor(start);

    for _ in 0..bars {
        let open = if rng.gen_bool(JUMP_PROBABILITY) {
            let jump: f64 = rng.gen_range(3.0..6.0) * volatility;
            if rng.gen_bool(0.5) {
                price * (1.0 + jump)
            } else {
                price * (1.0 - jump)
            }
        } else {
            price
        };
        let ret: f64 = rng.gen_range(-volatility..volatility);
        let close = open * (1.0 + ret);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..volatility / 2.0));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..volatility / 2.0));
        let volume = rng.gen_range(500.0..5_000.0);

        candles.push(Candle {
            symbol: symbol.to_string(),
            timeframe,
            open_time,
            open,
            high,
            low,
            close,
            volume,
        });
        price = close;
        open_time += step;
    }
    candles
}

/// Aggregate `candles` into `target` candles. Only buckets with every
/// constituent candle present are emitted.
pub fn resample(candles: &[Candle], target: Timeframe) -> Vec<Candle> {
    let Some(first) = candles.first() else {
        return Vec::new();
    };
    let source = first.timeframe;
    if target <= source {
        return candles.to_vec();
    }
    let expected = (target.duration().num_minutes() / source.duration().num_minutes()) as usize;

    let mut buckets: BTreeMap<DateTime<Utc>, (Candle, usize)> = BTreeMap::new();
    for c in candles {
        let key = target.floor(c.open_time);
        buckets
            .entry(key)
            .and_modify(|(agg, n)| {
                agg.high = agg.high.max(c.high);
                agg.low = agg.low.min(c.low);
                agg.close = c.close;
                agg.volume += c.volume;
                *n += 1;
            })
            .or_insert_with(|| {
                (
                    Candle {
                        timeframe: target,
                        open_time: key,
                        ..c.clone()
                    },
                    1,
                )
            });
    }
    buckets
        .into_values()
        .filter(|(_, n)| *n == expected)
        .map(|(c, _)| c)
        .collect()
}

/// A 1m series plus its resamples onto every timeframe in `timeframes`.
pub fn generate_series(
    symbol: &str,
    timeframes: &[Timeframe],
    start: DateTime<Utc>,
    minutes: usize,
) -> BTreeMap<Timeframe, Vec<Candle>> {
    let base = generate_candles(symbol, Timeframe::M1, start, minutes);
    timeframes
        .iter()
        .map(|tf| (*tf, resample(&base, *tf)))
        .collect()
}
