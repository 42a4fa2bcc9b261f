//! Observability for the creation chain.
//!
//! This module provides:
//! - `MetricsSink` for counters and named events
//! - `ErrorTracker` for failures swallowed at step boundaries
//! - `init_tracing` for installing a global `tracing` subscriber

mod errors;
mod logging;
mod metrics;

pub use errors::{CollectingErrorTracker, ErrorTracker, LoggingErrorTracker, TrackedError};
pub use logging::{init_tracing, LogFormat};
pub use metrics::{
    labels, CollectingMetricsSink, Labels, LoggingMetricsSink, MetricsSink, NoOpMetricsSink,
    RecordedIncrement,
};
