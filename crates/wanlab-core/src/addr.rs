// ── IPv4 / CIDR helpers ──
//
// Discovery reports addresses as `ip/prefix` strings. Everything here is
// total: malformed or missing input yields `None`/`false`, never an error.

use std::net::Ipv4Addr;

/// A parsed `ip/prefix` pair. A missing prefix means `/32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    pub addr: Ipv4Addr,
    pub prefix: u8,
}

impl Cidr {
    /// Parse `10.0.0.5/24` or a bare `10.0.0.5`. Prefixes above 32 are
    /// rejected.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let (ip, prefix) = match s.split_once('/') {
            Some((ip, p)) => (ip, p.trim().parse::<u8>().ok()?),
            None => (s, 32),
        };
        if prefix > 32 {
            return None;
        }
        let addr = ip.trim().parse::<Ipv4Addr>().ok()?;
        Some(Self { addr, prefix })
    }

    /// Network address at this CIDR's own prefix.
    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.addr) & mask(self.prefix))
    }
}

fn mask(prefix: u8) -> u32 {
    match prefix {
        0 => 0,
        p if p >= 32 => u32::MAX,
        p => u32::MAX << (32 - u32::from(p)),
    }
}

/// Whether two CIDRs fall in the same subnet, compared at the shorter of
/// the two prefixes.
pub fn same_subnet(a: &str, b: &str) -> bool {
    let (Some(a), Some(b)) = (Cidr::parse(a), Cidr::parse(b)) else {
        return false;
    };
    let m = mask(a.prefix.min(b.prefix));
    u32::from(a.addr) & m == u32::from(b.addr) & m
}

/// Host part of a CIDR string: `10.0.0.1/24` → `10.0.0.1`.
pub fn strip_prefix(cidr: &str) -> &str {
    cidr.split_once('/').map_or(cidr, |(ip, _)| ip).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_defaults_to_host_prefix() {
        let c = Cidr::parse("10.0.0.5").unwrap();
        assert_eq!(c.prefix, 32);
        assert_eq!(c.addr, Ipv4Addr::new(10, 0, 0, 5));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(Cidr::parse(""), None);
        assert_eq!(Cidr::parse("10.0.0/24"), None);
        assert_eq!(Cidr::parse("10.0.0.1/33"), None);
        assert_eq!(Cidr::parse("10.0.0.1/x"), None);
        assert_eq!(Cidr::parse("fe80::1/64"), None);
    }

    #[test]
    fn network_masks_host_bits() {
        let c = Cidr::parse("192.168.7.200/20").unwrap();
        assert_eq!(c.network(), Ipv4Addr::new(192, 168, 0, 0));
        assert_eq!(Cidr::parse("1.2.3.4/0").unwrap().network(), Ipv4Addr::UNSPECIFIED);
    }

    #[test]
    fn same_subnet_examples() {
        assert!(same_subnet("10.0.0.5/24", "10.0.0.9/24"));
        assert!(!same_subnet("10.0.0.5/24", "10.0.1.9/24"));
        assert!(same_subnet("10.0.0.5/24", "10.0.0.9/32"));
        assert!(same_subnet("10.0.0.5/16", "10.0.200.9/24"));
    }

    #[test]
    fn same_subnet_is_symmetric() {
        let samples = [
            "10.0.0.5/24",
            "10.0.1.9/24",
            "10.0.0.9/32",
            "10.0.0.1",
            "172.16.0.1/12",
            "not-an-ip",
            "",
        ];
        for a in samples {
            for b in samples {
                assert_eq!(same_subnet(a, b), same_subnet(b, a), "{a} vs {b}");
            }
        }
    }

    #[test]
    fn same_subnet_malformed_is_false() {
        assert!(!same_subnet("", "10.0.0.1/24"));
        assert!(!same_subnet("10.0.0.1/99", "10.0.0.1/24"));
    }

    #[test]
    fn strip_prefix_returns_host() {
        assert_eq!(strip_prefix("10.0.0.1/24"), "10.0.0.1");
        assert_eq!(strip_prefix("10.0.0.1"), "10.0.0.1");
    }
}
