//! Metrics sink boundary.
//!
//! Core DB logic MUST NOT depend on obs::metrics directly.
//! All instrumentation flows through MetricsEvent and MetricsSink.
//!
//! This module is the only allowed bridge between execution logic
//! and the global metrics state.
use crate::obs::metrics;
use std::{cell::RefCell, sync::Arc};

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<Arc<dyn MetricsSink>>> = const { RefCell::new(None) };
}

///
/// RejectKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RejectKind {
    IdCollision,
    IndexCollision,
    Conflict,
    NotFound,
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetricsEvent<'a> {
    CommitAttempt {
        collection: &'a str,
    },
    CommitRetry {
        collection: &'a str,
        attempt: u32,
    },
    Rejected {
        collection: &'a str,
        kind: RejectKind,
    },
    BatchSplit {
        batches: u64,
    },
    PartialBatch {
        committed: u64,
        total: u64,
    },
    SegmentsWritten {
        collection: &'a str,
        chunks: u64,
    },
    SegmentsReclaimed {
        collection: &'a str,
        chunks: u64,
    },
    Corruption {
        collection: &'a str,
    },
    StaleIndexSkipped {
        collection: &'a str,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink: Send + Sync {
    fn record(&self, event: MetricsEvent<'_>);
}

/// GlobalMetricsSink
/// Default process-wide sink that writes into global metrics state.
/// Acts as the concrete sink when no scoped override is installed.

pub(crate) struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent<'_>) {
        match event {
            MetricsEvent::CommitAttempt { collection } => {
                metrics::with_state_mut(|m| {
                    m.ops.commit_attempts = m.ops.commit_attempts.saturating_add(1);
                    let entry = metrics::with_collection_mut(m, collection);
                    entry.commit_attempts = entry.commit_attempts.saturating_add(1);
                });
            }

            MetricsEvent::CommitRetry { collection, .. } => {
                metrics::with_state_mut(|m| {
                    m.ops.commit_retries = m.ops.commit_retries.saturating_add(1);
                    let entry = metrics::with_collection_mut(m, collection);
                    entry.commit_retries = entry.commit_retries.saturating_add(1);
                });
            }

            MetricsEvent::Rejected { collection, kind } => {
                metrics::with_state_mut(|m| {
                    let counter = match kind {
                        RejectKind::IdCollision => &mut m.ops.id_collisions,
                        RejectKind::IndexCollision => &mut m.ops.index_collisions,
                        RejectKind::Conflict => &mut m.ops.conflicts,
                        RejectKind::NotFound => &mut m.ops.not_found,
                    };
                    *counter = counter.saturating_add(1);

                    let entry = metrics::with_collection_mut(m, collection);
                    entry.rejections = entry.rejections.saturating_add(1);
                });
            }

            MetricsEvent::BatchSplit { batches } => {
                metrics::with_state_mut(|m| {
                    m.ops.batch_splits = m.ops.batch_splits.saturating_add(batches);
                });
            }

            MetricsEvent::PartialBatch { .. } => {
                metrics::with_state_mut(|m| {
                    m.ops.partial_batches = m.ops.partial_batches.saturating_add(1);
                });
            }

            MetricsEvent::SegmentsWritten { collection, chunks } => {
                metrics::with_state_mut(|m| {
                    m.ops.segments_written = m.ops.segments_written.saturating_add(chunks);
                    let entry = metrics::with_collection_mut(m, collection);
                    entry.segments_written = entry.segments_written.saturating_add(chunks);
                });
            }

            MetricsEvent::SegmentsReclaimed { collection, chunks } => {
                metrics::with_state_mut(|m| {
                    m.ops.segments_reclaimed = m.ops.segments_reclaimed.saturating_add(chunks);
                    let entry = metrics::with_collection_mut(m, collection);
                    entry.segments_reclaimed = entry.segments_reclaimed.saturating_add(chunks);
                });
            }

            MetricsEvent::Corruption { collection } => {
                metrics::with_state_mut(|m| {
                    m.ops.corruptions = m.ops.corruptions.saturating_add(1);
                    let entry = metrics::with_collection_mut(m, collection);
                    entry.corruptions = entry.corruptions.saturating_add(1);
                });
            }

            MetricsEvent::StaleIndexSkipped { collection } => {
                metrics::with_state_mut(|m| {
                    m.ops.stale_index_skipped = m.ops.stale_index_skipped.saturating_add(1);
                    let entry = metrics::with_collection_mut(m, collection);
                    entry.stale_index_skipped = entry.stale_index_skipped.saturating_add(1);
                });
            }
        }
    }
}

pub(crate) const GLOBAL_METRICS_SINK: GlobalMetricsSink = GlobalMetricsSink;

pub(crate) fn record(event: MetricsEvent<'_>) {
    let override_sink = SINK_OVERRIDE.with(|cell| cell.borrow().clone());

    match override_sink {
        Some(sink) => sink.record(event),
        None => GLOBAL_METRICS_SINK.record(event),
    }
}

/// Snapshot the current metrics state for endpoint/test plumbing.
///
/// `window_start_ms` filters by window start (`EventState::since_ms`),
/// not by per-event timestamps.
#[must_use]
pub fn metrics_report(window_start_ms: Option<u64>) -> metrics::EventReport {
    metrics::report_window_start(window_start_ms)
}

/// Reset all metrics state.
pub fn metrics_reset_all() {
    metrics::reset_all();
}

/// Run a closure with a temporary metrics sink override.
///
/// The override is thread-scoped: events recorded by futures polled on
/// another worker thread still reach the global sink.
pub fn with_metrics_sink<T>(sink: Arc<dyn MetricsSink>, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<Arc<dyn MetricsSink>>);

    impl Drop for Guard {
        fn drop(&mut self) {
            let prev = self.0.take();
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = prev;
            });
        }
    }

    let prev = SINK_OVERRIDE.with(|cell| cell.borrow_mut().replace(sink));
    let _guard = Guard(prev);

    f()
}
