use crate::obs::{
    MetricsEvent, MetricsSink, RejectKind,
    metrics::{self, EventState},
    metrics_report,
    sink::{self, with_metrics_sink},
};
use parking_lot::Mutex;
use std::{panic::AssertUnwindSafe, sync::Arc};

///
/// CaptureSink
///

#[derive(Default)]
struct CaptureSink {
    events: Mutex<Vec<String>>,
}

impl MetricsSink for CaptureSink {
    fn record(&self, event: MetricsEvent<'_>) {
        self.events.lock().push(format!("{event:?}"));
    }
}

#[test]
fn override_captures_events_and_restores_previous_sink() {
    let outer = Arc::new(CaptureSink::default());
    let inner = Arc::new(CaptureSink::default());

    with_metrics_sink(outer.clone(), || {
        sink::record(MetricsEvent::CommitAttempt { collection: "a" });

        with_metrics_sink(inner.clone(), || {
            sink::record(MetricsEvent::Corruption { collection: "b" });
        });

        sink::record(MetricsEvent::StaleIndexSkipped { collection: "a" });
    });

    assert_eq!(outer.events.lock().len(), 2);
    assert_eq!(inner.events.lock().len(), 1);
    assert!(inner.events.lock()[0].contains("Corruption"));
}

#[test]
fn override_is_restored_after_panic() {
    let capture = Arc::new(CaptureSink::default());

    let installed = capture.clone();
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
        with_metrics_sink(installed, || panic!("boom"));
    }));
    assert!(result.is_err());

    // Nothing installed any more, so this goes to the global sink.
    sink::record(MetricsEvent::CommitAttempt {
        collection: "obs_tests_after_panic",
    });
    assert!(capture.events.lock().is_empty());
}

#[test]
fn global_sink_aggregates_per_collection() {
    let collection = "obs_tests_global_sink";

    sink::record(MetricsEvent::CommitAttempt { collection });
    sink::record(MetricsEvent::CommitRetry {
        collection,
        attempt: 1,
    });
    sink::record(MetricsEvent::Rejected {
        collection,
        kind: RejectKind::IndexCollision,
    });
    sink::record(MetricsEvent::SegmentsWritten {
        collection,
        chunks: 3,
    });

    let report = metrics_report(None);
    let (_, counters) = report
        .collection_counters
        .iter()
        .find(|(path, _)| path == collection)
        .expect("collection counters");

    assert!(counters.commit_attempts >= 1);
    assert!(counters.commit_retries >= 1);
    assert!(counters.rejections >= 1);
    assert!(counters.segments_written >= 3);
}

#[test]
fn collection_counters_are_created_once() {
    let mut state = EventState::default();

    metrics::with_collection_mut(&mut state, "a").commit_attempts += 1;
    metrics::with_collection_mut(&mut state, "a").commit_attempts += 1;
    metrics::with_collection_mut(&mut state, "b").rejections += 1;

    assert_eq!(state.collections.len(), 2);
    assert_eq!(state.collections["a"].commit_attempts, 2);
    assert_eq!(state.collections["b"].rejections, 1);
}

#[test]
fn report_window_in_the_future_is_empty() {
    let report = metrics_report(Some(u64::MAX));

    assert!(report.counters.is_none());
    assert!(report.collection_counters.is_empty());
}
