//! Cross-timeframe confluence signals.

pub mod aggregator;
pub mod signal;

pub use aggregator::{
    find_confluence, ActiveGaps, Confluence, ConfluenceAggregator, ConfluenceError,
    ConfluenceParams,
};
pub use signal::{Contribution, Signal};
