//! Metrics sink trait and implementations.

use std::collections::BTreeMap;
use tracing::{debug, info, Level};

/// Labels attached to a counter increment.
pub type Labels = BTreeMap<String, String>;

/// Receives counters and named events from telemetry steps.
///
/// Implementations must never panic or block; telemetry is best-effort.
pub trait MetricsSink: Send + Sync {
    /// Increments a counter.
    fn increment(&self, name: &str, labels: &Labels);

    /// Records a named event with a payload.
    fn event(&self, name: &str, data: serde_json::Value);
}

/// Builds a label set from pairs.
#[must_use]
pub fn labels<K: Into<String>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> Labels {
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetricsSink;

impl MetricsSink for NoOpMetricsSink {
    fn increment(&self, _name: &str, _labels: &Labels) {}

    fn event(&self, _name: &str, _data: serde_json::Value) {}
}

/// Writes metrics to the tracing log.
#[derive(Debug, Clone)]
pub struct LoggingMetricsSink {
    level: Level,
}

impl Default for LoggingMetricsSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingMetricsSink {
    /// Creates a sink logging at `level`.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl MetricsSink for LoggingMetricsSink {
    fn increment(&self, name: &str, labels: &Labels) {
        if self.level == Level::DEBUG {
            debug!(metric = %name, labels = ?labels, "counter incremented");
        } else {
            info!(metric = %name, labels = ?labels, "counter incremented");
        }
    }

    fn event(&self, name: &str, data: serde_json::Value) {
        if self.level == Level::DEBUG {
            debug!(event = %name, data = %data, "metrics event");
        } else {
            info!(event = %name, data = %data, "metrics event");
        }
    }
}

/// A recorded counter increment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedIncrement {
    /// Counter name.
    pub name: String,
    /// Labels.
    pub labels: Labels,
}

/// Collects metrics in memory for assertions.
#[derive(Debug, Default)]
pub struct CollectingMetricsSink {
    increments: parking_lot::RwLock<Vec<RecordedIncrement>>,
    events: parking_lot::RwLock<Vec<(String, serde_json::Value)>>,
}

impl CollectingMetricsSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every recorded increment.
    #[must_use]
    pub fn increments(&self) -> Vec<RecordedIncrement> {
        self.increments.read().clone()
    }

    /// Returns how many times `name` was incremented.
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.increments.read().iter().filter(|i| i.name == name).count()
    }

    /// Returns every recorded event.
    #[must_use]
    pub fn events(&self) -> Vec<(String, serde_json::Value)> {
        self.events.read().clone()
    }

    /// Returns events with the given name.
    #[must_use]
    pub fn events_named(&self, name: &str) -> Vec<serde_json::Value> {
        self.events
            .read()
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, d)| d.clone())
            .collect()
    }
}

impl MetricsSink for CollectingMetricsSink {
    fn increment(&self, name: &str, labels: &Labels) {
        self.increments.write().push(RecordedIncrement {
            name: name.to_string(),
            labels: labels.clone(),
        });
    }

    fn event(&self, name: &str, data: serde_json::Value) {
        self.events.write().push((name.to_string(), data));
    }
}
