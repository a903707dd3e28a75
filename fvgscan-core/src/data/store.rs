//! In-memory candle store keyed by (symbol, timeframe).

use super::gaps::find_missing_ranges;
use super::source::{CandleRange, CandleSource, DataError};
use crate::domain::{Candle, Timeframe};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

type PartitionKey = (String, Timeframe);

/// Candles held in memory, one ordered map per partition.
///
/// Inserting a candle whose open time already exists replaces it (upsert),
/// which keeps `open_time` unique per partition.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCandleStore {
    partitions: BTreeMap<PartitionKey, BTreeMap<DateTime<Utc>, Candle>>,
}

impl InMemoryCandleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, candle: Candle) {
        self.partitions
            .entry((candle.symbol.clone(), candle.timeframe))
            .or_default()
            .insert(candle.open_time, candle);
    }

    pub fn extend(&mut self, candles: impl IntoIterator<Item = Candle>) {
        for candle in candles {
            self.insert(candle);
        }
    }

    pub fn len(&self) -> usize {
        self.partitions.values().map(|p| p.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut out: Vec<String> = self.partitions.keys().map(|(s, _)| s.clone()).collect();
        out.dedup();
        out
    }

    pub fn timeframes(&self, symbol: &str) -> Vec<Timeframe> {
        self.partitions
            .keys()
            .filter(|(s, _)| s == symbol)
            .map(|(_, tf)| *tf)
            .collect()
    }

    /// Every candle in one partition, oldest first.
    pub fn all(&self, symbol: &str, timeframe: Timeframe) -> Vec<Candle> {
        self.partitions
            .get(&(symbol.to_string(), timeframe))
            .map(|p| p.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl CandleSource for InMemoryCandleStore {
    fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<CandleRange, DataError> {
        let partition = self
            .partitions
            .get(&(symbol.to_string(), timeframe))
            .ok_or_else(|| DataError::NoData {
                symbol: symbol.to_string(),
                timeframe,
            })?;
        if start >= end {
            return Ok(CandleRange::default());
        }
        let candles: Vec<Candle> = partition.range(start..end).map(|(_, c)| c.clone()).collect();
        let missing = find_missing_ranges(symbol, timeframe, &candles, start, end);
        Ok(CandleRange { candles, missing })
    }
}
