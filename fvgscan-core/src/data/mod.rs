//! Candle access: source trait, in-memory store, missing-range analysis.

pub mod gaps;
pub mod source;
pub mod store;

pub use gaps::find_missing_ranges;
pub use source::{CandleRange, CandleSource, DataError, MissingRange};
pub use store::InMemoryCandleStore;
