// ── Shaping profiles ──
//
// Desired impairment parameters for one port. The persisted JSON uses the
// backend's field names (`delay_ms`, `overhead`, `mpu`, ...) and is read
// leniently: older payloads carry `null`, empty strings, numeric strings,
// and stray `name`/`iface` fields.

use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::error::CoreError;
use crate::model::PortRole;

/// Minimum packet unit used for rate shaping unless configured otherwise.
pub const DEFAULT_MPU: u32 = 64;

/// Desired shaping parameters for one port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapingProfile {
    #[serde(default, deserialize_with = "lenient_u32")]
    pub delay_ms: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub jitter_ms: u32,
    /// Packet loss, percent in `[0, 100]`.
    #[serde(default, deserialize_with = "lenient_pct")]
    pub loss_pct: f64,
    /// Bit-error (corruption) rate, percent in `[0, 100]`.
    #[serde(default, deserialize_with = "lenient_pct")]
    pub ber_pct: f64,
    /// `tc` rate string such as `20mbit`; `None` means unlimited.
    #[serde(default, deserialize_with = "lenient_string")]
    pub rate: Option<String>,
    /// Queue limit in packets; `None` lets the backend choose.
    #[serde(default, deserialize_with = "lenient_opt_u32")]
    pub queue_limit: Option<u32>,
    /// Per-frame framing overhead in bytes.
    #[serde(default, rename = "overhead", deserialize_with = "lenient_opt_u32")]
    pub overhead_bytes: Option<u32>,
    #[serde(default = "default_mpu", rename = "mpu", deserialize_with = "lenient_mpu")]
    pub min_packet_unit: u32,
}

impl Default for ShapingProfile {
    fn default() -> Self {
        Self {
            delay_ms: 0,
            jitter_ms: 0,
            loss_pct: 0.0,
            ber_pct: 0.0,
            rate: None,
            queue_limit: None,
            overhead_bytes: None,
            min_packet_unit: DEFAULT_MPU,
        }
    }
}

impl ShapingProfile {
    /// `true` when the profile imposes no impairment at all.
    pub fn is_passthrough(&self) -> bool {
        self.delay_ms == 0
            && self.jitter_ms == 0
            && self.loss_pct <= 0.0
            && self.ber_pct <= 0.0
            && self.rate.is_none()
            && self.queue_limit.is_none()
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        check_pct("loss_pct", self.loss_pct)?;
        check_pct("ber_pct", self.ber_pct)?;
        if let Some(rate) = &self.rate {
            if rate.trim().is_empty() || rate.chars().any(char::is_whitespace) {
                return Err(CoreError::validation(format!("invalid rate {rate:?}")));
            }
        }
        Ok(())
    }

    /// One-line rendering used in probe logs and plain output:
    /// `delay=30ms, jitter=15ms, loss=2%, ber=0%, rate=20mbit, queue=auto`.
    pub fn settings_line(&self) -> String {
        format!(
            "delay={}ms, jitter={}ms, loss={}%, ber={}%, rate={}, queue={}",
            self.delay_ms,
            self.jitter_ms,
            self.loss_pct,
            self.ber_pct,
            self.rate.as_deref().unwrap_or("-"),
            self.queue_limit
                .map_or_else(|| "auto".to_owned(), |q| q.to_string()),
        )
    }
}

fn check_pct(field: &str, value: f64) -> Result<(), CoreError> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(CoreError::validation(format!(
            "{field} must be within 0..=100, got {value}"
        )))
    }
}

// ── ProfilePatch ────────────────────────────────────────────────────

/// Partial update for a profile. `None` leaves a field untouched; for the
/// optional fields `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfilePatch {
    pub delay_ms: Option<u32>,
    pub jitter_ms: Option<u32>,
    pub loss_pct: Option<f64>,
    pub ber_pct: Option<f64>,
    pub rate: Option<Option<String>>,
    pub queue_limit: Option<Option<u32>>,
    pub overhead_bytes: Option<Option<u32>>,
    pub min_packet_unit: Option<u32>,
}

impl ProfilePatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply onto `base`, returning the merged profile if it validates.
    /// `base` is never modified on failure.
    pub fn apply_to(&self, base: &ShapingProfile) -> Result<ShapingProfile, CoreError> {
        let mut merged = base.clone();
        if let Some(v) = self.delay_ms {
            merged.delay_ms = v;
        }
        if let Some(v) = self.jitter_ms {
            merged.jitter_ms = v;
        }
        if let Some(v) = self.loss_pct {
            merged.loss_pct = v;
        }
        if let Some(v) = self.ber_pct {
            merged.ber_pct = v;
        }
        if let Some(v) = &self.rate {
            merged.rate = v
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned);
        }
        if let Some(v) = self.queue_limit {
            merged.queue_limit = v.filter(|q| *q > 0);
        }
        if let Some(v) = self.overhead_bytes {
            merged.overhead_bytes = v.filter(|o| *o > 0);
        }
        if let Some(v) = self.min_packet_unit {
            merged.min_packet_unit = v;
        }
        merged.validate()?;
        Ok(merged)
    }
}

impl From<ShapingProfile> for ProfilePatch {
    /// A patch that overwrites every field.
    fn from(p: ShapingProfile) -> Self {
        Self {
            delay_ms: Some(p.delay_ms),
            jitter_ms: Some(p.jitter_ms),
            loss_pct: Some(p.loss_pct),
            ber_pct: Some(p.ber_pct),
            rate: Some(p.rate),
            queue_limit: Some(p.queue_limit),
            overhead_bytes: Some(p.overhead_bytes),
            min_packet_unit: Some(p.min_packet_unit),
        }
    }
}

// ── Presets ─────────────────────────────────────────────────────────

/// Named link profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Preset {
    None,
    WifiBad,
    #[strum(serialize = "mobile_3g")]
    Mobile3g,
    SatelliteGeo,
}

impl Preset {
    pub fn profile(self) -> ShapingProfile {
        let base = ShapingProfile::default();
        match self {
            Self::None => base,
            Self::WifiBad => ShapingProfile {
                delay_ms: 30,
                jitter_ms: 15,
                loss_pct: 2.0,
                rate: Some("20mbit".into()),
                ..base
            },
            Self::Mobile3g => ShapingProfile {
                delay_ms: 120,
                jitter_ms: 80,
                loss_pct: 1.0,
                ber_pct: 0.2,
                rate: Some("3mbit".into()),
                ..base
            },
            Self::SatelliteGeo => ShapingProfile {
                delay_ms: 600,
                jitter_ms: 50,
                loss_pct: 0.3,
                ber_pct: 0.3,
                rate: Some("10mbit".into()),
                queue_limit: Some(40),
                ..base
            },
        }
    }
}

/// Which ports a preset is applied to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum PresetScope {
    #[default]
    All,
    Clients,
    Servers,
}

impl PresetScope {
    pub fn includes(self, role: PortRole) -> bool {
        match self {
            Self::All => true,
            Self::Clients => role == PortRole::Client,
            Self::Servers => role == PortRole::Server,
        }
    }
}

// ── Lenient field readers ───────────────────────────────────────────

fn default_mpu() -> u32 {
    DEFAULT_MPU
}

fn number_of(v: Option<serde_json::Value>) -> Option<f64> {
    match v? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|f| f.is_finite())
}

#[allow(
    clippy::as_conversions,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn saturating_u32(f: f64) -> u32 {
    f.clamp(0.0, f64::from(u32::MAX)) as u32
}

fn lenient_u32<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(number_of(v).map_or(0, saturating_u32))
}

fn lenient_opt_u32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(number_of(v).map(saturating_u32).filter(|n| *n > 0))
}

fn lenient_mpu<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(number_of(v)
        .map(saturating_u32)
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_MPU))
}

fn lenient_pct<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(number_of(v).map_or(0.0, |f| f.clamp(0.0, 100.0)))
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match v {
        Some(serde_json::Value::String(s)) => Some(s.trim().to_owned()).filter(|s| !s.is_empty()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn null_and_missing_numeric_fields_read_as_zero() {
        let p: ShapingProfile = serde_json::from_value(json!({
            "name": "client1", "iface": "eth0",
            "delay_ms": null, "loss_pct": "", "rate": "", "queue_limit": null
        }))
        .unwrap();
        assert_eq!(p, ShapingProfile::default());
    }

    #[test]
    fn optional_fields_stay_none_not_zero() {
        let p: ShapingProfile =
            serde_json::from_value(json!({"queue_limit": 0, "overhead": ""})).unwrap();
        assert_eq!(p.queue_limit, None);
        assert_eq!(p.overhead_bytes, None);
        assert_eq!(p.min_packet_unit, DEFAULT_MPU);
    }

    #[test]
    fn numeric_strings_are_accepted() {
        let p: ShapingProfile = serde_json::from_value(json!({
            "delay_ms": "50", "jitter_ms": 10.0, "loss_pct": "1.5", "queue_limit": "40", "mpu": 128
        }))
        .unwrap();
        assert_eq!(p.delay_ms, 50);
        assert_eq!(p.jitter_ms, 10);
        assert!((p.loss_pct - 1.5).abs() < f64::EPSILON);
        assert_eq!(p.queue_limit, Some(40));
        assert_eq!(p.min_packet_unit, 128);
    }

    #[test]
    fn persisted_field_names_match_wire_format() {
        let v = serde_json::to_value(Preset::SatelliteGeo.profile()).unwrap();
        assert_eq!(
            v,
            json!({
                "delay_ms": 600, "jitter_ms": 50, "loss_pct": 0.3, "ber_pct": 0.3,
                "rate": "10mbit", "queue_limit": 40, "overhead": null, "mpu": 64
            })
        );
    }

    #[test]
    fn patch_merges_only_given_fields() {
        let base = Preset::WifiBad.profile();
        let patch = ProfilePatch {
            delay_ms: Some(50),
            rate: Some(None),
            ..ProfilePatch::default()
        };
        let merged = patch.apply_to(&base).unwrap();
        assert_eq!(merged.delay_ms, 50);
        assert_eq!(merged.jitter_ms, 15);
        assert_eq!(merged.rate, None);
    }

    #[test]
    fn patch_rejects_out_of_range_loss() {
        let patch = ProfilePatch {
            loss_pct: Some(101.0),
            ..ProfilePatch::default()
        };
        assert!(matches!(
            patch.apply_to(&ShapingProfile::default()),
            Err(CoreError::Validation { .. })
        ));
        let patch = ProfilePatch {
            ber_pct: Some(f64::NAN),
            ..ProfilePatch::default()
        };
        assert!(patch.apply_to(&ShapingProfile::default()).is_err());
    }

    #[test]
    fn presets_parse_from_names() {
        assert_eq!("mobile_3g".parse::<Preset>().unwrap(), Preset::Mobile3g);
        assert_eq!("WIFI_BAD".parse::<Preset>().unwrap(), Preset::WifiBad);
        assert_eq!(Preset::SatelliteGeo.to_string(), "satellite_geo");
        assert!(Preset::None.profile().is_passthrough());
    }

    #[test]
    fn settings_line_format() {
        assert_eq!(
            Preset::WifiBad.profile().settings_line(),
            "delay=30ms, jitter=15ms, loss=2%, ber=0%, rate=20mbit, queue=auto"
        );
        assert_eq!(
            Preset::SatelliteGeo.profile().settings_line(),
            "delay=600ms, jitter=50ms, loss=0.3%, ber=0.3%, rate=10mbit, queue=40"
        );
        assert_eq!(
            ShapingProfile::default().settings_line(),
            "delay=0ms, jitter=0ms, loss=0%, ber=0%, rate=-, queue=auto"
        );
    }

    #[test]
    fn scope_filters_roles() {
        assert!(PresetScope::All.includes(PortRole::Server));
        assert!(PresetScope::Clients.includes(PortRole::Client));
        assert!(!PresetScope::Clients.includes(PortRole::Server));
        assert!(!PresetScope::Servers.includes(PortRole::Client));
    }
}
