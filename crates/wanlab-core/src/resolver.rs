// ── Subnet resolution ──
//
// Pairs a client port with the server port on the same subnet (and the
// reverse) so probes know which address to ping. Pure functions over the
// port list in discovery order; deterministic for a fixed input.

use serde::Serialize;

use crate::addr::{same_subnet, strip_prefix};
use crate::model::{Port, PortKey};

/// Where a probe should go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeTarget {
    /// The port that owns `address`.
    pub peer: PortKey,
    /// Bare IPv4 address, prefix stripped.
    pub address: String,
}

impl ProbeTarget {
    fn from_port(port: &Port) -> Option<Self> {
        let address = port.address.as_deref()?;
        let host = strip_prefix(address);
        if host.is_empty() {
            return None;
        }
        Some(Self {
            peer: port.key.clone(),
            address: host.to_owned(),
        })
    }
}

/// Find the server port a client port should probe.
///
/// Same-subnet server-role port first (discovery order), then the primary
/// server designated at the last refresh, then the first server-role port
/// with an address.
pub fn resolve_server_for(
    client: &PortKey,
    ports: &[Port],
    primary_server: Option<&PortKey>,
) -> Option<ProbeTarget> {
    let servers: Vec<&Port> = ports
        .iter()
        .filter(|p| p.is_server() && p.address.is_some())
        .collect();

    if let Some(addr) = address_of(client, ports) {
        if let Some(sp) = servers
            .iter()
            .find(|sp| sp.address.as_deref().is_some_and(|sa| same_subnet(addr, sa)))
        {
            return ProbeTarget::from_port(sp);
        }
    }

    primary_server
        .and_then(|key| ports.iter().find(|p| p.key == *key))
        .and_then(ProbeTarget::from_port)
        .or_else(|| servers.first().and_then(|sp| ProbeTarget::from_port(sp)))
}

/// Find the client port a server port should probe.
///
/// Same-subnet client-role port first, then the first client-role port
/// with an address.
pub fn resolve_client_for(server: &PortKey, ports: &[Port]) -> Option<ProbeTarget> {
    let clients: Vec<&Port> = ports
        .iter()
        .filter(|p| !p.is_server() && p.address.is_some())
        .collect();

    if let Some(addr) = address_of(server, ports) {
        if let Some(cp) = clients
            .iter()
            .find(|cp| cp.address.as_deref().is_some_and(|ca| same_subnet(addr, ca)))
        {
            return ProbeTarget::from_port(cp);
        }
    }

    clients.first().and_then(|cp| ProbeTarget::from_port(cp))
}

fn address_of<'a>(key: &PortKey, ports: &'a [Port]) -> Option<&'a str> {
    ports
        .iter()
        .find(|p| p.key == *key)
        .and_then(|p| p.address.as_deref())
}
