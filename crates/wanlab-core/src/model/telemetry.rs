// ── Telemetry model ──
//
// Canonical per-port traffic counters. Both the push stream and the
// status poll are normalized into `TelemetrySummary` at the API boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

/// Last-known traffic counters for one port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySummary {
    /// Whether a shaping qdisc is installed on the interface.
    pub active: bool,
    pub tx_bytes: u64,
    pub tx_frames: u64,
    pub drops_total: u64,
    pub drop_pct: f64,
    pub queue_bytes: u64,
    pub queue_frames: u64,
}

impl TelemetrySummary {
    /// `true` if any monotonic counter went backwards relative to `prev`
    /// (qdisc replaced, container restarted). Queue depth is a gauge and
    /// is not considered.
    pub fn is_reset_from(&self, prev: &Self) -> bool {
        self.tx_bytes < prev.tx_bytes
            || self.tx_frames < prev.tx_frames
            || self.drops_total < prev.drops_total
    }
}

/// Which channel delivered a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TelemetrySource {
    Stream,
    Poll,
}

/// Stored telemetry for one port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub summary: TelemetrySummary,
    /// Set when this update replaced a higher counter value.
    pub reset_detected: bool,
    pub source: TelemetrySource,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_counter_is_reset() {
        let prev = TelemetrySummary {
            tx_bytes: 100,
            ..TelemetrySummary::default()
        };
        let next = TelemetrySummary {
            tx_bytes: 50,
            ..TelemetrySummary::default()
        };
        assert!(next.is_reset_from(&prev));
        assert!(!prev.is_reset_from(&next));
    }

    #[test]
    fn queue_shrink_is_not_reset() {
        let prev = TelemetrySummary {
            queue_bytes: 3000,
            queue_frames: 2,
            ..TelemetrySummary::default()
        };
        assert!(!TelemetrySummary::default().is_reset_from(&prev));
    }
}
