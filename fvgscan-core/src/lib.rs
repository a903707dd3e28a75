//! FVG Scan Core: candles, parameters, gap detection, confluence, trade setups.
//!
//! This crate contains the analytical pipeline:
//! - Domain types (candles, timeframes, directions, stable ids)
//! - Layered, versioned detection/risk parameters
//! - Three-candle fair value gap detection with incremental tracking
//! - Cross-timeframe confluence aggregation with deduplication
//! - ATR-based trade setup derivation and risk sizing
//! - Candle source and notification sink traits
//!
//! Nothing here performs I/O; candle sources and sinks are injected.

pub mod confluence;
pub mod data;
pub mod detector;
pub mod domain;
pub mod indicators;
pub mod params;
pub mod setup;
pub mod sink;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: types shared with scanner worker threads are Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Candle>();
        require_sync::<domain::Candle>();
        require_send::<detector::Gap>();
        require_sync::<detector::Gap>();
        require_send::<detector::GapTracker>();
        require_sync::<detector::GapTracker>();
        require_send::<confluence::Signal>();
        require_sync::<confluence::Signal>();
        require_send::<confluence::ConfluenceAggregator>();
        require_sync::<confluence::ConfluenceAggregator>();
        require_send::<setup::Setup>();
        require_sync::<setup::Setup>();
        require_send::<params::ParameterStore>();
        require_sync::<params::ParameterStore>();
        require_send::<data::InMemoryCandleStore>();
        require_sync::<data::InMemoryCandleStore>();
        require_send::<sink::CollectingSink>();
        require_sync::<sink::CollectingSink>();
    }

    /// Architecture contract: gap detection sees only candles and parameters,
    /// never account state.
    #[test]
    fn detector_has_no_account_parameter() {
        fn _check_signature(
            candles: &[domain::Candle],
            params: &params::ParameterSet,
        ) -> Result<Vec<detector::Gap>, detector::SequenceError> {
            detector::detect(candles, params)
        }
    }
}
