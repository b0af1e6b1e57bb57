// ── API-to-domain type conversions ──
//
// Bridges raw `wanlab_api` wire types into canonical domain types, and
// domain intents back into request payloads.

use tracing::debug;

use wanlab_api::models::{DiscoveredPort, PortRef, PortSetting, QdiscSummary, StatusEntry, StatusMap};

use crate::model::{Port, PortKey, PortOrigin, ShapingProfile, TelemetrySummary};

// ── Discovery ────────────────────────────────────────────────────────

impl From<DiscoveredPort> for Port {
    fn from(p: DiscoveredPort) -> Self {
        Port {
            key: PortKey::new(p.name, p.iface),
            address: p.ipv4.filter(|a| !a.trim().is_empty()),
            mac: p.mac.filter(|m| !m.trim().is_empty()),
            origin: PortOrigin::Discovered,
        }
    }
}

// ── Telemetry ────────────────────────────────────────────────────────

impl From<&QdiscSummary> for TelemetrySummary {
    fn from(s: &QdiscSummary) -> Self {
        TelemetrySummary {
            active: s.active,
            tx_bytes: s.tx.bytes,
            tx_frames: s.tx.frames,
            drops_total: s.drops.total,
            drop_pct: s.drops.pct,
            queue_bytes: s.queue.bytes,
            queue_frames: s.queue.frames,
        }
    }
}

/// Normalize a status payload into canonical summaries.
///
/// Keys that do not parse as `name:iface` and per-port error entries are
/// dropped.
pub fn status_to_summaries(map: &StatusMap) -> Vec<(PortKey, TelemetrySummary)> {
    map.iter()
        .filter_map(|(raw, entry)| {
            let Ok(key) = raw.parse::<PortKey>() else {
                debug!(key = %raw, "skipping status entry with malformed key");
                return None;
            };
            match entry {
                StatusEntry::Ok { summary, .. } => Some((key, TelemetrySummary::from(summary))),
                StatusEntry::Failed { error } => {
                    debug!(key = %raw, error = %error, "backend reported status error");
                    None
                }
            }
        })
        .collect()
}

// ── Intents ──────────────────────────────────────────────────────────

impl From<&PortKey> for PortRef {
    fn from(key: &PortKey) -> Self {
        PortRef {
            name: key.name().to_owned(),
            iface: key.iface().to_owned(),
        }
    }
}

/// Build the apply payload for one port.
pub fn to_port_setting(key: &PortKey, profile: &ShapingProfile) -> PortSetting {
    PortSetting {
        name: key.name().to_owned(),
        iface: key.iface().to_owned(),
        delay_ms: profile.delay_ms,
        jitter_ms: profile.jitter_ms,
        loss_pct: profile.loss_pct,
        ber_pct: profile.ber_pct,
        rate: profile.rate.clone(),
        queue_limit: profile.queue_limit,
        overhead: profile.overhead_bytes,
        mpu: Some(profile.min_packet_unit),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn discovered_port_drops_blank_address() {
        let port: Port = DiscoveredPort {
            name: "client1".into(),
            iface: "eth0@if7".into(),
            ipv4: Some(String::new()),
            mac: Some("02:42:ac:11:00:02".into()),
        }
        .into();
        assert_eq!(port.key.to_string(), "client1:eth0@if7");
        assert_eq!(port.address, None);
        assert_eq!(port.mac.as_deref(), Some("02:42:ac:11:00:02"));
    }

    #[test]
    fn status_map_keeps_ok_entries_only() {
        let map: StatusMap = serde_json::from_value(serde_json::json!({
            "client1:eth0": {
                "qdisc": "qdisc netem 8001: root",
                "summary": {
                    "active": true,
                    "tx": { "bytes": 1500, "frames": 10 },
                    "drops": { "total": 2, "pct": 16.7 },
                    "queue": { "bytes": 0, "frames": 0 }
                }
            },
            "client2:eth0": { "error": "Cannot find device" },
            "garbage": { "summary": {} }
        }))
        .unwrap();

        let out = status_to_summaries(&map);
        assert_eq!(out.len(), 1);
        let (key, summary) = &out[0];
        assert_eq!(*key, PortKey::new("client1", "eth0@if9"));
        assert_eq!(summary.tx_bytes, 1500);
        assert_eq!(summary.drops_total, 2);
        assert!(summary.active);
    }

    #[test]
    fn port_setting_carries_raw_iface_and_mpu() {
        let key = PortKey::new("client1", "eth0@if7");
        let profile = ShapingProfile {
            delay_ms: 50,
            loss_pct: 1.0,
            ..ShapingProfile::default()
        };
        let setting = to_port_setting(&key, &profile);
        assert_eq!(setting.iface, "eth0@if7");
        assert_eq!(setting.delay_ms, 50);
        assert_eq!(setting.mpu, Some(64));
        assert_eq!(setting.queue_limit, None);
    }
}
