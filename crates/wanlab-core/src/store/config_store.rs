// ── Durable port configuration ──
//
// Three blobs: the per-port profile mapping (`ports`), the named lab
// snapshots (`snapshots`), and the registry of hand-added ports
// (`custom_ports`). Reads degrade to empty on missing or corrupt data;
// writes overwrite the whole blob.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::model::{
    EXPORT_SCHEMA, ExportMeta, LabExport, LabImport, LabSnapshot, PortKey, PortRole, ProfileMap,
    ShapingProfile,
};
use crate::store::blob::BlobStore;

const PORTS_BLOB: &str = "ports";
const SNAPSHOTS_BLOB: &str = "snapshots";
const CUSTOM_PORTS_BLOB: &str = "custom_ports";

/// Persistence for profiles, snapshots and custom ports.
#[derive(Clone)]
pub struct ConfigStore {
    blobs: Arc<dyn BlobStore>,
}

impl ConfigStore {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    // ── Profile mapping ──────────────────────────────────────────────

    /// Last-persisted mapping. Missing or corrupt data yields an empty map.
    pub fn load(&self) -> ProfileMap {
        self.read_or_default(PORTS_BLOB)
    }

    /// Overwrite the persisted mapping.
    pub fn save(&self, mapping: &ProfileMap) -> Result<(), CoreError> {
        self.write(PORTS_BLOB, mapping)
    }

    /// Upsert the given profiles into the persisted mapping. Existing
    /// entries with the same identity under a different raw key string are
    /// replaced, not duplicated.
    pub fn merge<'a>(
        &self,
        profiles: impl IntoIterator<Item = (&'a PortKey, &'a ShapingProfile)>,
    ) -> Result<(), CoreError> {
        let mut mapping = self.load();
        for (key, profile) in profiles {
            remove_identity(&mut mapping, key);
            mapping.insert(key.to_string(), profile.clone());
        }
        self.save(&mapping)
    }

    /// Drop a port's persisted profile.
    pub fn forget(&self, key: &PortKey) -> Result<(), CoreError> {
        let mut mapping = self.load();
        if remove_identity(&mut mapping, key) {
            self.save(&mapping)?;
        }
        Ok(())
    }

    // ── Custom port registry ─────────────────────────────────────────

    pub fn custom_ports(&self) -> Vec<PortKey> {
        let raw: Vec<String> = self.read_or_default(CUSTOM_PORTS_BLOB);
        let mut seen = BTreeSet::new();
        raw.into_iter()
            .filter_map(|s| match s.parse::<PortKey>() {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!(error = %e, "ignoring malformed custom port entry");
                    None
                }
            })
            .filter(|key| seen.insert(key.clone()))
            .collect()
    }

    pub fn add_custom_port(&self, key: &PortKey) -> Result<(), CoreError> {
        let mut keys = self.custom_ports();
        if keys.contains(key) {
            return Ok(());
        }
        keys.push(key.clone());
        self.write_custom_ports(&keys)
    }

    pub fn remove_custom_port(&self, key: &PortKey) -> Result<(), CoreError> {
        let mut keys = self.custom_ports();
        let before = keys.len();
        keys.retain(|k| k != key);
        if keys.len() == before {
            return Ok(());
        }
        self.write_custom_ports(&keys)
    }

    fn write_custom_ports(&self, keys: &[PortKey]) -> Result<(), CoreError> {
        let raw: Vec<String> = keys.iter().map(ToString::to_string).collect();
        self.write(CUSTOM_PORTS_BLOB, &raw)
    }

    // ── Snapshots ────────────────────────────────────────────────────

    fn snapshots(&self) -> BTreeMap<String, LabSnapshot> {
        let mut all: BTreeMap<String, LabSnapshot> = self.read_or_default(SNAPSHOTS_BLOB);
        for (name, snap) in &mut all {
            snap.name.clone_from(name);
        }
        all
    }

    /// Snapshot names, sorted.
    pub fn list_snapshots(&self) -> Vec<String> {
        self.snapshots().into_keys().collect()
    }

    /// Store `cfg` under `name`, overwriting any snapshot of that name.
    pub fn save_snapshot(
        &self,
        name: &str,
        cfg: ProfileMap,
        saved_at: DateTime<Utc>,
    ) -> Result<LabSnapshot, CoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::validation("snapshot name must not be empty"));
        }
        let snap = LabSnapshot {
            name: name.to_owned(),
            saved_at,
            cfg,
        };
        let mut all = self.snapshots();
        all.insert(name.to_owned(), snap.clone());
        self.write(SNAPSHOTS_BLOB, &all)?;
        debug!(name, ports = snap.cfg.len(), "snapshot saved");
        Ok(snap)
    }

    pub fn load_snapshot(&self, name: &str) -> Result<LabSnapshot, CoreError> {
        self.snapshots()
            .remove(name.trim())
            .ok_or_else(|| CoreError::SnapshotNotFound {
                name: name.to_owned(),
            })
    }

    pub fn delete_snapshot(&self, name: &str) -> Result<(), CoreError> {
        let mut all = self.snapshots();
        if all.remove(name.trim()).is_none() {
            return Err(CoreError::SnapshotNotFound {
                name: name.to_owned(),
            });
        }
        self.write(SNAPSHOTS_BLOB, &all)
    }

    // ── Export / import ──────────────────────────────────────────────

    /// Build an export document for `cfg`.
    pub fn export(cfg: ProfileMap, saved_at: DateTime<Utc>) -> LabExport {
        let ports = infer_port_count(cfg.keys().map(String::as_str));
        LabExport {
            meta: ExportMeta {
                schema: EXPORT_SCHEMA.to_owned(),
                saved_at: saved_at.to_rfc3339_opts(SecondsFormat::Millis, true),
                ports,
            },
            cfg,
        }
    }

    /// Parse an export document (`{meta, cfg}`) or a bare mapping.
    ///
    /// All-or-nothing: any entry that is not a profile object rejects the
    /// whole document. Nothing is persisted here; see [`Self::import`].
    pub fn parse_import(text: &str) -> Result<LabImport, CoreError> {
        let malformed = |message: String| CoreError::MalformedPersisted { message };

        let doc: serde_json::Value =
            serde_json::from_str(text).map_err(|e| malformed(format!("invalid JSON: {e}")))?;
        let serde_json::Value::Object(mut obj) = doc else {
            return Err(malformed("expected a JSON object".into()));
        };

        let (meta_value, cfg_value) = match obj.remove("cfg") {
            Some(cfg @ serde_json::Value::Object(_)) => (obj.remove("meta"), cfg),
            Some(other) => {
                obj.insert("cfg".into(), other);
                (None, serde_json::Value::Object(obj))
            }
            None => (None, serde_json::Value::Object(obj)),
        };

        let serde_json::Value::Object(entries) = cfg_value else {
            return Err(malformed("expected a mapping of port keys".into()));
        };
        let mut cfg = ProfileMap::new();
        for (key, value) in entries {
            if !value.is_object() {
                return Err(malformed(format!("entry {key:?} is not a profile object")));
            }
            let profile: ShapingProfile = serde_json::from_value(value)
                .map_err(|e| malformed(format!("entry {key:?}: {e}")))?;
            cfg.insert(key, profile);
        }

        let meta: Option<ExportMeta> = meta_value.and_then(|m| serde_json::from_value(m).ok());
        let inferred = infer_port_count(cfg.keys().map(String::as_str));
        let desired_ports = meta.as_ref().map_or(0, |m| m.ports).max(inferred);

        Ok(LabImport {
            cfg,
            desired_ports,
            meta,
        })
    }

    /// Parse and, on success, replace the persisted mapping with the
    /// imported one. The caller refreshes afterwards.
    pub fn import(&self, text: &str) -> Result<LabImport, CoreError> {
        let parsed = Self::parse_import(text)?;
        self.save(&parsed.cfg)?;
        Ok(parsed)
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn read_or_default<T: serde::de::DeserializeOwned + Default>(&self, name: &str) -> T {
        let raw = match self.blobs.get(name) {
            Ok(Some(raw)) => raw,
            Ok(None) => return T::default(),
            Err(e) => {
                warn!(blob = name, error = %e, "blob unreadable, using empty");
                return T::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                let err = CoreError::MalformedPersisted {
                    message: e.to_string(),
                };
                warn!(blob = name, error = %err, "discarding corrupt blob");
                T::default()
            }
        }
    }

    fn write<T: serde::Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<(), CoreError> {
        let text = serde_json::to_string_pretty(value)
            .map_err(|e| CoreError::Internal(format!("serialize {name}: {e}")))?;
        self.blobs.put(name, &text)
    }
}

fn remove_identity(mapping: &mut ProfileMap, key: &PortKey) -> bool {
    let before = mapping.len();
    mapping.retain(|k, _| k.parse::<PortKey>().map_or(k != &key.to_string(), |p| p != *key));
    mapping.len() != before
}

/// Lab size implied by a set of keys: the larger of the number of distinct
/// `client<N>` names and the number of distinct interfaces on server-role
/// names.
pub fn infer_port_count<'a>(keys: impl IntoIterator<Item = &'a str>) -> u32 {
    let mut clients = BTreeSet::new();
    let mut server_ifaces = BTreeSet::new();
    for raw in keys {
        let Ok(key) = raw.parse::<PortKey>() else {
            continue;
        };
        if is_numbered_client(key.name()) {
            clients.insert(key.name().to_ascii_lowercase());
        }
        if key.role() == PortRole::Server {
            server_ifaces.insert(key.normalized_iface().to_owned());
        }
    }
    u32::try_from(clients.len().max(server_ifaces.len())).unwrap_or(u32::MAX)
}

fn is_numbered_client(name: &str) -> bool {
    name.get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("client"))
        && name.len() > 6
        && name.bytes().skip(6).all(|b| b.is_ascii_digit())
}
