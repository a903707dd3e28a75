//! Multi-timeframe confluence.
//!
//! Evaluation is an explicit join keyed by symbol: the caller hands over
//! every timeframe's active gaps as of one close time, and the aggregator
//! decides whether enough timeframes agree on a direction.

use super::signal::{Contribution, Signal};
use crate::detector::Gap;
use crate::domain::{Direction, GapId, SignalId, Timeframe};
use crate::params::ParameterResolver;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{info, warn};

/// Active gaps per timeframe for one symbol as of one close time.
pub type ActiveGaps = BTreeMap<Timeframe, Vec<Gap>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfluenceError {
    #[error("{symbol}: bullish and bearish confluence tied at {count} timeframes")]
    Ambiguous { symbol: String, count: usize },
}

/// Thresholds for one symbol's confluence evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfluenceParams {
    /// Distinct timeframes required.
    pub quorum: usize,
    /// Per-timeframe maximum gap age, exclusive: a gap counts while its age
    /// is below this. Timeframes absent here are unbounded.
    pub max_age: BTreeMap<Timeframe, usize>,
}

impl ConfluenceParams {
    /// Resolve thresholds for `symbol`. The quorum comes from the lowest
    /// timeframe in `timeframes`, max age from each timeframe's own set.
    pub fn resolve(resolver: &ParameterResolver<'_>, symbol: &str, timeframes: &[Timeframe]) -> Self {
        let anchor = timeframes.iter().min().copied().unwrap_or(Timeframe::M1);
        let max_age = timeframes
            .iter()
            .map(|tf| (*tf, resolver.resolve(symbol, *tf).max_gap_age))
            .collect();
        Self {
            quorum: resolver.resolve(symbol, anchor).min_timeframe_confluence,
            max_age,
        }
    }

    fn max_age_for(&self, timeframe: Timeframe) -> usize {
        self.max_age.get(&timeframe).copied().unwrap_or(usize::MAX)
    }
}

/// Outcome of a pure confluence evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Confluence {
    pub direction: Direction,
    pub contributions: Vec<Contribution>,
}

impl Confluence {
    pub fn count(&self) -> usize {
        self.contributions.len()
    }

    fn key(&self) -> BTreeSet<(Timeframe, GapId)> {
        self.contributions
            .iter()
            .map(|c| (c.timeframe, c.gap.id.clone()))
            .collect()
    }
}

fn qualifies(gap: &Gap, direction: Direction, max_age: usize) -> bool {
    gap.direction == direction && gap.is_active() && gap.age < max_age
}

fn qualifying(
    active: &ActiveGaps,
    direction: Direction,
    params: &ConfluenceParams,
) -> Vec<Contribution> {
    active
        .iter()
        .filter_map(|(tf, gaps)| {
            let max_age = params.max_age_for(*tf);
            gaps.iter()
                .filter(|g| qualifies(g, direction, max_age))
                .max_by_key(|g| g.formed_at)
                .map(|g| Contribution {
                    timeframe: *tf,
                    gap: g.clone(),
                })
        })
        .collect()
}

/// Pure evaluation: which direction, if any, meets the quorum.
///
/// When both directions qualify the higher count wins; an exact tie is
/// `ConfluenceError::Ambiguous`.
pub fn find_confluence(
    symbol: &str,
    active: &ActiveGaps,
    params: &ConfluenceParams,
) -> Result<Option<Confluence>, ConfluenceError> {
    let bullish = qualifying(active, Direction::Bullish, params);
    let bearish = qualifying(active, Direction::Bearish, params);
    let bull_ok = bullish.len() >= params.quorum;
    let bear_ok = bearish.len() >= params.quorum;

    let (direction, contributions) = match (bull_ok, bear_ok) {
        (false, false) => return Ok(None),
        (true, false) => (Direction::Bullish, bullish),
        (false, true) => (Direction::Bearish, bearish),
        (true, true) => match bullish.len().cmp(&bearish.len()) {
            std::cmp::Ordering::Greater => (Direction::Bullish, bullish),
            std::cmp::Ordering::Less => (Direction::Bearish, bearish),
            std::cmp::Ordering::Equal => {
                return Err(ConfluenceError::Ambiguous {
                    symbol: symbol.to_string(),
                    count: bullish.len(),
                })
            }
        },
    };
    Ok(Some(Confluence {
        direction,
        contributions,
    }))
}

/// Swap each contribution back to the gap previously emitted for its
/// timeframe while that gap still qualifies.
fn pin_to_emitted(
    confluence: &mut Confluence,
    active: &ActiveGaps,
    last: &BTreeSet<(Timeframe, GapId)>,
    params: &ConfluenceParams,
) {
    let direction = confluence.direction;
    for c in &mut confluence.contributions {
        let max_age = params.max_age_for(c.timeframe);
        let Some(gaps) = active.get(&c.timeframe) else {
            continue;
        };
        let pinned = last
            .iter()
            .filter(|(tf, _)| *tf == c.timeframe)
            .find_map(|(_, id)| {
                gaps.iter()
                    .find(|g| &g.id == id && qualifies(g, direction, max_age))
            });
        if let Some(gap) = pinned {
            c.gap = gap.clone();
        }
    }
}

/// Stateful per-symbol aggregator that deduplicates emitted signals.
///
/// A timeframe stays represented by the gap it last contributed for as long
/// as that gap qualifies; a newer gap on the same timeframe takes over only
/// once the old one fills or expires. A signal is re-emitted for a direction
/// only when the contributing (timeframe, gap) set gains a member the last
/// emitted set lacked.
#[derive(Debug, Clone)]
pub struct ConfluenceAggregator {
    symbol: String,
    last_emitted: BTreeMap<Direction, BTreeSet<(Timeframe, GapId)>>,
}

impl ConfluenceAggregator {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            last_emitted: BTreeMap::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Evaluate the join at close time `at` and return any new signal.
    pub fn aggregate(
        &mut self,
        active: &ActiveGaps,
        params: &ConfluenceParams,
        at: DateTime<Utc>,
    ) -> Vec<Signal> {
        let mut confluence = match find_confluence(&self.symbol, active, params) {
            Ok(Some(c)) => c,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(symbol = %self.symbol, at = %at, error = %e, "ambiguous confluence, no signal");
                return Vec::new();
            }
        };

        let key = match self.last_emitted.get(&confluence.direction) {
            Some(last) => {
                pin_to_emitted(&mut confluence, active, last, params);
                let key = confluence.key();
                if key.is_subset(last) {
                    return Vec::new();
                }
                key
            }
            None => confluence.key(),
        };

        let signal = self.build_signal(confluence, &key, at);
        info!(
            symbol = %signal.symbol,
            direction = %signal.direction,
            confluence = signal.confluence_count,
            primary = %signal.primary_timeframe,
            id = signal.id.short(),
            "confluence signal"
        );
        self.last_emitted.insert(signal.direction, key);
        vec![signal]
    }

    fn build_signal(
        &self,
        confluence: Confluence,
        key: &BTreeSet<(Timeframe, GapId)>,
        at: DateTime<Utc>,
    ) -> Signal {
        let mut id_src = format!("{}|{}", self.symbol, confluence.direction);
        for (tf, gap_id) in key {
            id_src.push_str(&format!("|{tf}:{gap_id}"));
        }
        let mut contributions = confluence.contributions;
        contributions.sort_by_key(|c| c.timeframe);
        let primary_timeframe = contributions
            .last()
            .map(|c| c.timeframe)
            .unwrap_or(Timeframe::M1);
        Signal {
            id: SignalId::from_bytes(id_src.as_bytes()),
            symbol: self.symbol.clone(),
            direction: confluence.direction,
            formed_at: at,
            confluence_count: contributions.len(),
            primary_timeframe,
            contributions,
        }
    }
}
