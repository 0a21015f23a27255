use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliverySource {
    Broker,
    Fallback,
}

/// Observability counters for the pipeline, owned by `AppState` and shared
/// between the worker, the publisher and the status endpoint. Explicitly
/// not a global: everything is reached through the state it lives in.
pub struct PipelineStats {
    enabled: AtomicBool,
    source: Mutex<DeliverySource>,
    last_poll_at: Mutex<Option<DateTime<Utc>>>,
    sent_by_kind: Mutex<HashMap<String, u64>>,
    failed_by_kind: Mutex<HashMap<String, u64>>,
    dead_letters: AtomicU64,
    queue_depth: AtomicI64,
}

#[derive(Serialize)]
pub struct StatsSnapshot {
    pub enabled: bool,
    pub delivery_source: DeliverySource,
    pub seconds_since_last_poll: Option<i64>,
    pub queue_depth: i64,
    pub dead_letters: u64,
    pub sent_by_kind: HashMap<String, u64>,
    pub failed_by_kind: HashMap<String, u64>,
}

impl PipelineStats {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            source: Mutex::new(DeliverySource::Broker),
            last_poll_at: Mutex::new(None),
            sent_by_kind: Mutex::new(HashMap::new()),
            failed_by_kind: Mutex::new(HashMap::new()),
            dead_letters: AtomicU64::new(0),
            queue_depth: AtomicI64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn record_poll(&self) {
        *self.last_poll_at.lock().unwrap() = Some(Utc::now());
    }

    /// Returns true when the source actually changed, so the transition can
    /// be logged once instead of once per intent.
    pub fn set_source(&self, source: DeliverySource) -> bool {
        let mut current = self.source.lock().unwrap();
        if *current == source {
            return false;
        }
        *current = source;
        true
    }

    pub fn record_sent(&self, kind: &str) {
        *self.sent_by_kind.lock().unwrap().entry(kind.to_string()).or_insert(0) += 1;
    }

    pub fn record_failed(&self, kind: &str) {
        *self.failed_by_kind.lock().unwrap().entry(kind.to_string()).or_insert(0) += 1;
    }

    pub fn record_dead_letter(&self) {
        self.dead_letters.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_queue_depth(&self, depth: i64) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let last_poll = *self.last_poll_at.lock().unwrap();
        StatsSnapshot {
            enabled: self.is_enabled(),
            delivery_source: *self.source.lock().unwrap(),
            seconds_since_last_poll: last_poll.map(|at| (Utc::now() - at).num_seconds()),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            dead_letters: self.dead_letters.load(Ordering::Relaxed),
            sent_by_kind: self.sent_by_kind.lock().unwrap().clone(),
            failed_by_kind: self.failed_by_kind.lock().unwrap().clone(),
        }
    }
}
