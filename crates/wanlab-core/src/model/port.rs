// ── Port identity ──
//
// A port is one (container, interface) pair. The interface name reported
// by discovery may carry a peer/scope suffix (`eth0@if23:`); identity
// comparison strips it, display and storage keep it.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use strum::{Display, EnumString};

const SERVER_SUFFIX: &str = "_server";

/// Strip the scope qualifier from a raw interface name: everything from
/// the first `@`, then every trailing `:`.
///
/// `"eth0@if23:"` → `"eth0"`, `"eth0::"` → `"eth0"`, `"eth0"` → `"eth0"`.
pub fn normalize_iface(raw: &str) -> &str {
    let base = raw.split_once('@').map_or(raw, |(base, _)| base);
    base.trim_end_matches(':')
}

/// Whether a container name follows the server-role naming convention.
pub fn is_server_name(name: &str) -> bool {
    name.len() >= SERVER_SUFFIX.len()
        && name
            .get(name.len() - SERVER_SUFFIX.len()..)
            .is_some_and(|tail| tail.eq_ignore_ascii_case(SERVER_SUFFIX))
}

// ── PortKey ─────────────────────────────────────────────────────────

/// Canonical port key.
///
/// Displays as `name:rawIface`. Equality, ordering and hashing use
/// `(name, normalize_iface(iface))`, so `client1:eth0@if5` and
/// `client1:eth0` are the same key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortKey {
    name: String,
    iface: String,
}

impl PortKey {
    pub fn new(name: impl Into<String>, iface: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            iface: iface.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw interface name, as discovered or typed.
    pub fn iface(&self) -> &str {
        &self.iface
    }

    /// Interface name with any scope qualifier removed.
    pub fn normalized_iface(&self) -> &str {
        normalize_iface(&self.iface)
    }

    /// `(name, normalizedIface)`, the comparison identity.
    pub fn identity(&self) -> (&str, &str) {
        (&self.name, self.normalized_iface())
    }

    pub fn role(&self) -> PortRole {
        PortRole::of(&self.name)
    }
}

impl PartialEq for PortKey {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for PortKey {}

impl Hash for PortKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl PartialOrd for PortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identity().cmp(&other.identity())
    }
}

impl fmt::Display for PortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.iface)
    }
}

/// Error for a key string without a `name:iface` shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid port key {0:?}: expected name:iface")]
pub struct ParsePortKeyError(pub String);

impl FromStr for PortKey {
    type Err = ParsePortKeyError;

    /// Splits on the first `:` only; the rest is the raw interface.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((name, iface)) if !name.trim().is_empty() && !iface.trim().is_empty() => {
                Ok(Self::new(name.trim(), iface.trim()))
            }
            _ => Err(ParsePortKeyError(s.to_owned())),
        }
    }
}

impl TryFrom<String> for PortKey {
    type Error = ParsePortKeyError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PortKey> for String {
    fn from(key: PortKey) -> Self {
        key.to_string()
    }
}

// ── Role / origin ───────────────────────────────────────────────────

/// Server ports are the ones whose container name ends in `_server`
/// (case-insensitive); everything else is a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PortRole {
    Server,
    Client,
}

impl PortRole {
    pub fn of(name: &str) -> Self {
        if is_server_name(name) {
            Self::Server
        } else {
            Self::Client
        }
    }
}

/// Where a port entry came from. `Custom` is sticky: once an operator
/// adds a port by hand it stays custom even if discovery later reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PortOrigin {
    Discovered,
    Custom,
}

// ── Port ────────────────────────────────────────────────────────────

/// One emulated network port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub key: PortKey,
    /// CIDR string (`10.0.0.2/24`) if the interface has an IPv4 address.
    pub address: Option<String>,
    pub mac: Option<String>,
    pub origin: PortOrigin,
}

impl Port {
    pub fn discovered(name: &str, iface: &str, address: Option<String>) -> Self {
        Self {
            key: PortKey::new(name, iface),
            address,
            mac: None,
            origin: PortOrigin::Discovered,
        }
    }

    pub fn custom(key: PortKey) -> Self {
        Self {
            key,
            address: None,
            mac: None,
            origin: PortOrigin::Custom,
        }
    }

    pub fn name(&self) -> &str {
        self.key.name()
    }

    pub fn iface(&self) -> &str {
        self.key.iface()
    }

    pub fn role(&self) -> PortRole {
        self.key.role()
    }

    pub fn is_server(&self) -> bool {
        self.role() == PortRole::Server
    }
}
