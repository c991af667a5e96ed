use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    time::{SystemTime, UNIX_EPOCH},
};

///
/// EventState
/// Ephemeral, in-memory counters for write-protocol activity.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EventState {
    pub ops: EventOps,
    pub collections: BTreeMap<String, CollectionCounters>,
    pub since_ms: u64,
}

impl Default for EventState {
    fn default() -> Self {
        Self {
            ops: EventOps::default(),
            collections: BTreeMap::new(),
            since_ms: now_millis(),
        }
    }
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EventOps {
    // Write protocol
    pub commit_attempts: u64,
    pub commit_retries: u64,

    // Rejections by reason
    pub id_collisions: u64,
    pub index_collisions: u64,
    pub conflicts: u64,
    pub not_found: u64,

    // Batch wrapper
    pub batch_splits: u64,
    pub partial_batches: u64,

    // Segmentation
    pub segments_written: u64,
    pub segments_reclaimed: u64,

    // Integrity
    pub corruptions: u64,
    pub stale_index_skipped: u64,
}

///
/// CollectionCounters
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CollectionCounters {
    pub commit_attempts: u64,
    pub commit_retries: u64,
    pub rejections: u64,
    pub segments_written: u64,
    pub segments_reclaimed: u64,
    pub corruptions: u64,
    pub stale_index_skipped: u64,
}

static EVENT_STATE: Mutex<Option<EventState>> = Mutex::new(None);

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Borrow metrics immutably.
pub(crate) fn with_state<R>(f: impl FnOnce(&EventState) -> R) -> R {
    let mut guard = EVENT_STATE.lock();
    f(guard.get_or_insert_with(EventState::default))
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    let mut guard = EVENT_STATE.lock();
    f(guard.get_or_insert_with(EventState::default))
}

/// Borrow one collection's counters mutably, creating them on first use.
pub(crate) fn with_collection_mut<'a>(
    state: &'a mut EventState,
    collection: &str,
) -> &'a mut CollectionCounters {
    state
        .collections
        .entry(collection.to_string())
        .or_default()
}

/// Reset all counters.
pub(crate) fn reset_all() {
    with_state_mut(|m| *m = EventState::default());
}

///
/// EventReport
/// Counter snapshot plus per-collection summaries.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventReport {
    /// Ephemeral runtime counters since `since_ms`.
    pub counters: Option<EventState>,
    /// Per-collection counters, ordered by collection path.
    pub collection_counters: Vec<(String, CollectionCounters)>,
}

/// Build a metrics report, optionally filtered by window start.
#[must_use]
pub(crate) fn report_window_start(window_start_ms: Option<u64>) -> EventReport {
    let snap = with_state(Clone::clone);

    if let Some(requested) = window_start_ms
        && requested > snap.since_ms
    {
        return EventReport::default();
    }

    let collection_counters = snap
        .collections
        .iter()
        .map(|(path, counters)| (path.clone(), counters.clone()))
        .collect();

    EventReport {
        counters: Some(snap),
        collection_counters,
    }
}
