use crate::detector::Gap;
use crate::domain::{Direction, SignalId, Timeframe};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One timeframe's share of a confluence signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub timeframe: Timeframe,
    pub gap: Gap,
}

/// Cross-timeframe agreement on one symbol and direction. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: SignalId,
    pub symbol: String,
    pub direction: Direction,
    /// Close time of the bar on which the quorum was observed.
    pub formed_at: DateTime<Utc>,
    /// Sorted by timeframe, lowest first.
    pub contributions: Vec<Contribution>,
    pub confluence_count: usize,
    /// Highest contributing timeframe.
    pub primary_timeframe: Timeframe,
}

impl Signal {
    pub fn timeframes(&self) -> impl Iterator<Item = Timeframe> + '_ {
        self.contributions.iter().map(|c| c.timeframe)
    }

    pub fn contains_timeframe(&self, timeframe: Timeframe) -> bool {
        self.timeframes().any(|tf| tf == timeframe)
    }

    /// Contribution from the primary timeframe.
    pub fn primary_gap(&self) -> Option<&Gap> {
        self.contributions
            .iter()
            .find(|c| c.timeframe == self.primary_timeframe)
            .map(|c| &c.gap)
    }
}
