// ── Telemetry board ──
//
// Last-known counters per port. Every update overwrites the stored
// record for each key it carries; keys it does not carry are untouched.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::debug;

use crate::model::{PortKey, TelemetryRecord, TelemetrySource, TelemetrySummary};

/// Point-in-time view of every stored record.
pub type TelemetrySnapshot = BTreeMap<PortKey, TelemetryRecord>;

/// Reactive per-port telemetry storage.
pub struct TelemetryBoard {
    records: DashMap<PortKey, TelemetryRecord>,
    /// Bumped on every mutation.
    version: watch::Sender<u64>,
    snapshot: watch::Sender<Arc<TelemetrySnapshot>>,
}

impl TelemetryBoard {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(TelemetrySnapshot::new()));
        Self {
            records: DashMap::new(),
            version,
            snapshot,
        }
    }

    /// Store one snapshot. Returns the keys whose counters went backwards.
    pub fn apply(
        &self,
        batch: &[(PortKey, TelemetrySummary)],
        source: TelemetrySource,
    ) -> Vec<PortKey> {
        if batch.is_empty() {
            return Vec::new();
        }
        let now = Utc::now();
        let mut resets = Vec::new();
        for (key, summary) in batch {
            let reset_detected = self
                .records
                .get(key)
                .is_some_and(|prev| summary.is_reset_from(&prev.summary));
            if reset_detected {
                debug!(key = %key, %source, "counter reset");
                resets.push(key.clone());
            }
            self.records.insert(
                key.clone(),
                TelemetryRecord {
                    summary: *summary,
                    reset_detected,
                    source,
                    updated_at: now,
                },
            );
        }
        self.publish();
        resets
    }

    /// Drop the record for a removed port.
    pub fn remove(&self, key: &PortKey) -> Option<TelemetryRecord> {
        let removed = self.records.remove(key).map(|(_, r)| r);
        if removed.is_some() {
            self.publish();
        }
        removed
    }

    pub fn get(&self, key: &PortKey) -> Option<TelemetryRecord> {
        self.records.get(key).map(|r| r.value().clone())
    }

    pub fn snapshot(&self) -> Arc<TelemetrySnapshot> {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<TelemetrySnapshot>> {
        self.snapshot.subscribe()
    }

    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn publish(&self) {
        let snap: TelemetrySnapshot = self
            .records
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        self.snapshot.send_modify(|s| *s = Arc::new(snap));
        self.version.send_modify(|v| *v += 1);
    }
}

impl Default for TelemetryBoard {
    fn default() -> Self {
        Self::new()
    }
}
