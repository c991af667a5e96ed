//! Observability: runtime telemetry (metrics) and sink abstractions.
//!
//! Engine code reports through [`sink::record`] only; it never touches
//! metrics state directly.

pub(crate) mod metrics;
pub(crate) mod sink;

#[cfg(test)]
mod tests;

// re-exports
pub use metrics::{CollectionCounters, EventOps, EventReport, EventState};
pub use sink::{
    MetricsEvent, MetricsSink, RejectKind, metrics_report, metrics_reset_all, with_metrics_sink,
};
