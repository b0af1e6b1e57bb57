// Lab backend wire types
//
// Request and response bodies for the shaping backend. Response fields use
// `#[serde(default)]` liberally: the `tc` summary parser on the backend
// emits `null` for anything it could not find, and an inactive qdisc
// reports only `{"active": false}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ── Discovery ────────────────────────────────────────────────────────

/// One interface of one lab container, as returned by `GET /ports`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredPort {
    pub name: String,
    pub iface: String,
    /// CIDR string such as `10.0.0.2/24`.
    #[serde(default)]
    pub ipv4: Option<String>,
    #[serde(default)]
    pub mac: Option<String>,
}

/// `(container, interface)` pair used by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRef {
    pub name: String,
    pub iface: String,
}

// ── Shaping ──────────────────────────────────────────────────────────

/// One item of `POST /links/apply_ports_matrix`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortSetting {
    pub name: String,
    pub iface: String,
    pub delay_ms: u32,
    pub jitter_ms: u32,
    pub loss_pct: f64,
    pub ber_pct: f64,
    pub rate: Option<String>,
    pub queue_limit: Option<u32>,
    pub overhead: Option<u32>,
    pub mpu: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplyMatrixRequest<'a> {
    pub items: &'a [PortSetting],
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplyMatrixResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusPortsRequest<'a> {
    pub ports: &'a [PortRef],
}

// ── Status ───────────────────────────────────────────────────────────

/// Per-port status keyed by `name:cleanIface`.
pub type StatusMap = BTreeMap<String, StatusEntry>;

/// A status entry is either a parsed qdisc or a per-port error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusEntry {
    Ok {
        #[serde(default)]
        qdisc: String,
        summary: QdiscSummary,
    },
    Failed {
        error: serde_json::Value,
    },
}

/// Parsed `tc -s qdisc show` output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QdiscSummary {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub delay_ms: Option<u32>,
    #[serde(default)]
    pub jitter_ms: Option<u32>,
    #[serde(default)]
    pub loss_pct: Option<f64>,
    #[serde(default)]
    pub ber_pct: Option<f64>,
    #[serde(default)]
    pub rate: Option<String>,
    #[serde(default)]
    pub queue_limit: Option<u32>,
    #[serde(default)]
    pub tx: TxCounters,
    #[serde(default)]
    pub drops: DropCounters,
    #[serde(default)]
    pub queue: QueueCounters,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxCounters {
    #[serde(default)]
    pub bytes: u64,
    #[serde(default)]
    pub frames: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DropCounters {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub pct: f64,
    #[serde(default)]
    pub overlimits: u64,
    #[serde(default)]
    pub requeues: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounters {
    #[serde(default)]
    pub bytes: u64,
    #[serde(default)]
    pub frames: u64,
    #[serde(default)]
    pub qlen: Option<u64>,
}

// ── Tools ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct PingRequest<'a> {
    pub source: &'a str,
    pub target: &'a str,
    pub count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
}

/// Result of one `ping` execution inside the source container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub rc: i32,
    #[serde(default)]
    pub out: String,
}

// ── Lab lifecycle ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize)]
pub struct LabInitRequest {
    pub ports: u32,
    pub recreate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabInitResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub clients: Vec<String>,
    #[serde(default)]
    pub networks: Vec<String>,
}

/// Bare `{"ok": true}` acknowledgement.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct OkResponse {
    #[serde(default)]
    pub ok: bool,
}
