use std::sync::Arc;
use std::time::Instant;

use jiff::{SignedDuration, Timestamp};
use serde::Serialize;
use skylink_core::{Aggregator, CombinedSnapshot, SensorRecord};
use tokio::sync::Mutex;

/// Why an item from the link was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Framing or encoding failure in the decoder.
    Framing,
    /// Known tag with a bad field list.
    Malformed,
    UnknownTag,
}

/// Counters exposed over `/stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RelayStats {
    pub frames_received: u64,
    pub framing_errors: u64,
    pub malformed_payloads: u64,
    pub unknown_tags: u64,
    pub records_applied: u64,
    pub publishes_attempted: u64,
    pub publishes_succeeded: u64,
    pub publishes_failed: u64,
    pub last_publish: Option<Timestamp>,
}

/// Shared state of the relay: the aggregator with its publish gate, and the
/// counters.
pub struct RelayState {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    aggregator: Aggregator,
    stats: RelayStats,
    startup_time: Instant,
}

impl RelayState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                aggregator: Aggregator::new(),
                stats: RelayStats::default(),
                startup_time: Instant::now(),
            })),
        }
    }

    /// Count a payload that made it through framing.
    pub async fn frame_received(&self) {
        let mut inner = self.inner.lock().await;
        inner.stats.frames_received += 1;
    }

    /// Apply a record and decide whether to publish, as one step.
    ///
    /// Returns the snapshot to publish when the gate fires. The attempt is
    /// counted here so that `publishes_attempted` never lags the gate.
    pub async fn ingest(
        &self,
        record: &SensorRecord,
        now: Timestamp,
        interval: SignedDuration,
    ) -> Option<CombinedSnapshot> {
        let mut inner = self.inner.lock().await;
        inner.stats.records_applied += 1;
        let fired = inner.aggregator.ingest(record, now, interval);
        if fired.is_some() {
            inner.stats.publishes_attempted += 1;
        }
        fired
    }

    pub async fn record_dropped(&self, reason: DropReason) {
        let mut inner = self.inner.lock().await;
        let counter = match reason {
            DropReason::Framing => &mut inner.stats.framing_errors,
            DropReason::Malformed => &mut inner.stats.malformed_payloads,
            DropReason::UnknownTag => &mut inner.stats.unknown_tags,
        };
        *counter += 1;
    }

    /// Record the outcome of a publish dispatched at `at`.
    pub async fn record_publish(&self, ok: bool, at: Timestamp) {
        let mut inner = self.inner.lock().await;
        if ok {
            inner.stats.publishes_succeeded += 1;
            inner.stats.last_publish = Some(at);
        } else {
            inner.stats.publishes_failed += 1;
        }
    }

    pub async fn snapshot(&self) -> CombinedSnapshot {
        let inner = self.inner.lock().await;
        inner.aggregator.snapshot()
    }

    pub async fn stats(&self) -> RelayStats {
        let inner = self.inner.lock().await;
        inner.stats.clone()
    }

    /// Get the relay uptime in seconds.
    pub async fn uptime_secs(&self) -> u64 {
        let inner = self.inner.lock().await;
        inner.startup_time.elapsed().as_secs()
    }
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for RelayState {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
