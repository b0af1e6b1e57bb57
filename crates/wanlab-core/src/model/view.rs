// ── Joined port view ──

use serde::Serialize;

use super::{Port, PortKey, PortOrigin, PortRole, ShapingProfile, TelemetryRecord};

/// A port with its desired profile and last-known telemetry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortView {
    pub key: PortKey,
    pub role: PortRole,
    pub origin: PortOrigin,
    pub address: Option<String>,
    pub mac: Option<String>,
    pub profile: ShapingProfile,
    pub telemetry: Option<TelemetryRecord>,
}

impl PortView {
    pub fn new(port: &Port, profile: &ShapingProfile, telemetry: Option<TelemetryRecord>) -> Self {
        Self {
            key: port.key.clone(),
            role: port.role(),
            origin: port.origin,
            address: port.address.clone(),
            mac: port.mac.clone(),
            profile: profile.clone(),
            telemetry,
        }
    }
}
