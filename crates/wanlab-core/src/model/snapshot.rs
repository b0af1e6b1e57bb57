// ── Lab snapshots and export documents ──

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{PortKey, ShapingProfile};

/// Schema tag written into exported lab documents.
pub const EXPORT_SCHEMA: &str = "wanlab.lab.v1";

/// Stored profile mapping, keyed by the `name:iface` key string.
///
/// Keys stay strings: a snapshot may reference ports that no longer
/// exist, and an unparseable key must not invalidate the rest.
pub type ProfileMap = BTreeMap<String, ShapingProfile>;

/// A named, timestamped set of profiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabSnapshot {
    #[serde(skip)]
    pub name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub cfg: ProfileMap,
}

impl LabSnapshot {
    /// Profile for `key`, matched by identity (scope suffixes ignored).
    pub fn profile_for(&self, key: &PortKey) -> Option<&ShapingProfile> {
        lookup(&self.cfg, key)
    }
}

/// Identity-aware lookup in a key-string map: an exact string hit first,
/// then any key that parses to the same identity.
pub fn lookup<'a>(map: &'a ProfileMap, key: &PortKey) -> Option<&'a ShapingProfile> {
    map.get(&key.to_string()).or_else(|| {
        map.iter()
            .find(|(k, _)| k.parse::<PortKey>().is_ok_and(|parsed| parsed == *key))
            .map(|(_, v)| v)
    })
}

/// Metadata block of an exported lab document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportMeta {
    pub schema: String,
    /// RFC 3339 timestamp.
    pub saved_at: String,
    /// Lab size the document was exported from.
    #[serde(default)]
    pub ports: u32,
}

/// `{meta, cfg}` export document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabExport {
    pub meta: ExportMeta,
    pub cfg: ProfileMap,
}

/// Result of reading an export document.
#[derive(Debug, Clone, PartialEq)]
pub struct LabImport {
    pub cfg: ProfileMap,
    /// `max(meta.ports, inferred from keys)`; 0 when nothing suggests a size.
    pub desired_ports: u32,
    pub meta: Option<ExportMeta>,
}
