//! Domain types for FVG Scan

pub mod candle;
pub mod direction;
pub mod ids;
pub mod timeframe;

pub use candle::Candle;
pub use direction::Direction;
pub use ids::{GapId, RunId, SignalId};
pub use timeframe::{ParseTimeframeError, Timeframe, DEFAULT_TIMEFRAMES};

/// Symbol type alias
pub type Symbol = String;
