//! Delivery of trade setups to the outside world.

use crate::confluence::Signal;
use crate::setup::Setup;
use std::sync::{Mutex, PoisonError};
use tracing::info;

/// Receives every setup produced on the live path.
///
/// Implementations must not block the caller for long; delivery transport
/// (chat, e-mail, webhooks) lives behind this trait.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, signal: &Signal, setup: &Setup);
}

/// Writes each setup as a structured log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, signal: &Signal, setup: &Setup) {
        info!(
            symbol = %setup.symbol,
            direction = %setup.direction,
            confluence = signal.confluence_count,
            primary = %signal.primary_timeframe,
            entry = setup.entry,
            stop_loss = setup.stop_loss,
            take_profit = setup.take_profit,
            size = setup.position_size,
            "trade setup"
        );
    }
}

/// Keeps every delivered (signal, setup) pair in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    received: Mutex<Vec<(Signal, Setup)>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything delivered so far.
    pub fn received(&self) -> Vec<(Signal, Setup)> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NotificationSink for CollectingSink {
    fn notify(&self, signal: &Signal, setup: &Setup) {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((signal.clone(), setup.clone()));
    }
}
