use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Shared record of when the source agent was last heard from.
///
/// `mark_seen` races benignly between ingest and heartbeat handlers: the
/// stored timestamp only ever moves forward. Readers take lock-free
/// snapshots; staleness of one poll interval is acceptable.
pub struct LivenessTracker {
    /// Epoch milliseconds of the last mark; 0 means never seen.
    last_seen_ms: AtomicU64,
    window: Duration,
}

impl LivenessTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            last_seen_ms: AtomicU64::new(0),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Records a sighting of the source. Monotonic: an older timestamp
    /// never rolls the record back.
    pub fn mark_seen(&self, now: DateTime<Utc>) {
        let ms = now.timestamp_millis().max(1) as u64;
        self.last_seen_ms.fetch_max(ms, Ordering::SeqCst);
    }

    pub fn has_seen(&self) -> bool {
        self.last_seen_ms.load(Ordering::SeqCst) != 0
    }

    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        match self.last_seen_ms.load(Ordering::SeqCst) {
            0 => None,
            ms => Utc.timestamp_millis_opt(ms as i64).single(),
        }
    }

    /// False if the source has never been seen, otherwise whether the
    /// last sighting is within the window (boundary inclusive).
    pub fn is_alive(&self, now: DateTime<Utc>) -> bool {
        let ms = self.last_seen_ms.load(Ordering::SeqCst);
        if ms == 0 {
            return false;
        }
        let elapsed = now.timestamp_millis() - ms as i64;
        elapsed <= self.window.as_millis() as i64
    }
}
