// ── Merged port table ──
//
// Backend-discovered ports plus operator-added custom ports, each with its
// desired shaping profile. Insertion order is discovery order, custom
// ports that discovery did not report follow in their previous order.

use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use crate::error::CoreError;
use crate::model::snapshot::lookup;
use crate::model::{Port, PortKey, PortOrigin, ProfileMap, ProfilePatch, ShapingProfile};

/// One row of the table.
#[derive(Debug, Clone, PartialEq)]
pub struct PortEntry {
    pub port: Port,
    pub profile: ShapingProfile,
}

/// What a refresh changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshDiff {
    pub added: Vec<PortKey>,
    pub removed: Vec<PortKey>,
}

impl RefreshDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// The merged port table.
#[derive(Debug, Clone, Default)]
pub struct PortTable {
    entries: IndexMap<PortKey, PortEntry>,
    primary_server: Option<PortKey>,
}

impl PortTable {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Replace the discovered set.
    ///
    /// Custom ports missing from `discovered` are kept verbatim. Each port
    /// keeps its current profile; ports new to the table take their
    /// profile from `stored`, else the default. Duplicate identities in
    /// `discovered` keep the first occurrence. Idempotent.
    pub fn refresh(&mut self, discovered: Vec<Port>, stored: &ProfileMap) -> RefreshDiff {
        let mut next: IndexMap<PortKey, PortEntry> = IndexMap::with_capacity(discovered.len());
        let mut primary = None;

        for mut port in discovered {
            if next.contains_key(&port.key) {
                debug!(key = %port.key, "duplicate port in discovery, keeping first");
                continue;
            }
            let previous = self.entries.get(&port.key);
            if previous.is_some_and(|e| e.port.origin == PortOrigin::Custom) {
                port.origin = PortOrigin::Custom;
            }
            let profile = previous.map_or_else(
                || lookup(stored, &port.key).cloned().unwrap_or_default(),
                |e| e.profile.clone(),
            );
            if primary.is_none() && port.is_server() {
                primary = Some(port.key.clone());
            }
            next.insert(port.key.clone(), PortEntry { port, profile });
        }

        for (key, entry) in &self.entries {
            if entry.port.origin == PortOrigin::Custom && !next.contains_key(key) {
                next.insert(key.clone(), entry.clone());
            }
        }

        let diff = RefreshDiff {
            added: next
                .keys()
                .filter(|k| !self.entries.contains_key(*k))
                .cloned()
                .collect(),
            removed: self
                .entries
                .keys()
                .filter(|k| !next.contains_key(*k))
                .cloned()
                .collect(),
        };

        self.entries = next;
        self.primary_server = primary;
        diff
    }

    /// Add an operator-defined port with the default profile (or the
    /// given one).
    pub fn add_custom(
        &mut self,
        key: PortKey,
        profile: Option<ShapingProfile>,
    ) -> Result<&PortEntry, CoreError> {
        if key.name().trim().is_empty() || key.normalized_iface().trim().is_empty() {
            return Err(CoreError::validation("port name and interface are required"));
        }
        if self.entries.contains_key(&key) {
            return Err(CoreError::DuplicateKey { key });
        }
        let entry = PortEntry {
            port: Port::custom(key.clone()),
            profile: profile.unwrap_or_default(),
        };
        let (idx, _) = self.entries.insert_full(key, entry);
        self.entries
            .get_index(idx)
            .map(|(_, e)| e)
            .ok_or_else(|| CoreError::Internal("inserted entry vanished".into()))
    }

    /// Delete a port regardless of origin. Returns the removed entry;
    /// removing an absent key is a no-op.
    pub fn remove(&mut self, key: &PortKey) -> Option<PortEntry> {
        let removed = self.entries.shift_remove(key);
        if removed.is_some() && self.primary_server.as_ref() == Some(key) {
            self.primary_server = None;
        }
        removed
    }

    /// Merge `patch` into the port's profile.
    pub fn edit(&mut self, key: &PortKey, patch: &ProfilePatch) -> Result<&PortEntry, CoreError> {
        let entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| CoreError::UnknownKey {
                key: key.to_string(),
            })?;
        entry.profile = patch.apply_to(&entry.profile)?;
        Ok(entry)
    }

    /// Replace a port's profile wholesale.
    pub fn set_profile(&mut self, key: &PortKey, profile: ShapingProfile) -> Result<(), CoreError> {
        profile.validate()?;
        let entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| CoreError::UnknownKey {
                key: key.to_string(),
            })?;
        entry.profile = profile;
        Ok(())
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn get(&self, key: &PortKey) -> Option<&PortEntry> {
        self.entries.get(key)
    }

    /// Resolve an operator-typed key string to the table's own key (which
    /// carries the raw interface name as discovered).
    pub fn resolve(&self, raw: &str) -> Result<&PortKey, CoreError> {
        let unknown = || CoreError::UnknownKey { key: raw.to_owned() };
        let key: PortKey = raw.parse().map_err(|_| unknown())?;
        self.entries
            .get_key_value(&key)
            .map(|(k, _)| k)
            .ok_or_else(unknown)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PortEntry> {
        self.entries.values()
    }

    pub fn keys(&self) -> Vec<PortKey> {
        self.entries.keys().cloned().collect()
    }

    /// Ports in table order.
    pub fn ports(&self) -> Vec<Port> {
        self.entries.values().map(|e| e.port.clone()).collect()
    }

    /// Current profiles keyed by display key.
    pub fn profiles(&self) -> ProfileMap {
        self.entries
            .iter()
            .map(|(k, e)| (k.to_string(), e.profile.clone()))
            .collect()
    }

    /// First server-role port of the last discovery.
    pub fn primary_server(&self) -> Option<&PortKey> {
        self.primary_server.as_ref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
