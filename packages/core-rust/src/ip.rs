//! IP addresses and CIDR ranges, keyed by network and prefix length.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::types::{EntityKind, SurrogateId};

/// Natural key of an [`Ip`] record: a base address plus CIDR prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IpKey {
    pub address: IpAddr,
    pub prefix: u8,
}

impl IpKey {
    /// Key for a single host address (full-length prefix).
    #[must_use]
    pub fn host(address: IpAddr) -> Self {
        Self {
            address,
            prefix: max_prefix(address),
        }
    }

    /// Key for a CIDR range. Prefixes longer than the address family allows
    /// are clamped.
    #[must_use]
    pub fn range(address: IpAddr, prefix: u8) -> Self {
        Self {
            address,
            prefix: prefix.min(max_prefix(address)),
        }
    }
}

impl fmt::Display for IpKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix)
    }
}

fn max_prefix(address: IpAddr) -> u8 {
    match address {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

/// A recorded address or range.
///
/// Address and prefix form the cache key and cannot change after
/// construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ip {
    address: IpAddr,
    prefix: u8,
    pub created: i64,
}

impl Ip {
    #[must_use]
    pub fn new(key: IpKey, created: i64) -> Self {
        Self {
            address: key.address,
            prefix: key.prefix,
            created,
        }
    }

    #[must_use]
    pub fn address(&self) -> IpAddr {
        self.address
    }

    #[must_use]
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    #[must_use]
    pub fn ip_key(&self) -> IpKey {
        IpKey::range(self.address, self.prefix)
    }

    /// Whether `addr` falls inside this record's CIDR range.
    /// Addresses of a different family never match.
    #[must_use]
    pub fn contains(&self, addr: IpAddr) -> bool {
        match (self.address, addr) {
            (IpAddr::V4(net), IpAddr::V4(candidate)) => {
                let shift = 32 - u32::from(self.prefix.min(32));
                let mask = u32::MAX.checked_shl(shift).unwrap_or(0);
                u32::from(net) & mask == u32::from(candidate) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(candidate)) => {
                let shift = 128 - u32::from(self.prefix.min(128));
                let mask = u128::MAX.checked_shl(shift).unwrap_or(0);
                u128::from(net) & mask == u128::from(candidate) & mask
            }
            _ => false,
        }
    }
}

impl Entity for Ip {
    type Key = IpKey;
    const KIND: EntityKind = EntityKind::Ip;

    fn key(&self, _id: SurrogateId) -> IpKey {
        self.ip_key()
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, Ipv6Addr};

    use proptest::prelude::*;

    use super::*;

    fn v4(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(a, b, c, d))
    }

    #[test]
    fn host_key_uses_full_prefix() {
        assert_eq!(IpKey::host(v4(10, 0, 0, 1)).prefix, 32);
        assert_eq!(IpKey::host(IpAddr::V6(Ipv6Addr::LOCALHOST)).prefix, 128);
        assert_eq!(IpKey::host(v4(10, 0, 0, 1)).to_string(), "10.0.0.1/32");
    }

    #[test]
    fn range_prefix_is_clamped() {
        assert_eq!(IpKey::range(v4(10, 0, 0, 0), 40).prefix, 32);
    }

    #[test]
    fn cidr_membership() {
        let net = Ip::new(IpKey::range(v4(192, 168, 1, 0), 24), 0);
        assert!(net.contains(v4(192, 168, 1, 77)));
        assert!(!net.contains(v4(192, 168, 2, 1)));
        assert!(!net.contains(IpAddr::V6(Ipv6Addr::LOCALHOST)));

        let everything = Ip::new(IpKey::range(v4(0, 0, 0, 0), 0), 0);
        assert!(everything.contains(v4(8, 8, 8, 8)));
    }

    #[test]
    fn natural_key_round_trips_prefix() {
        let ip = Ip::new(IpKey::range(v4(10, 1, 0, 0), 16), 0);
        assert_eq!(ip.natural_key().as_deref(), Some("10.1.0.0/16"));
    }

    proptest! {
        #[test]
        fn host_record_contains_only_itself(a: u32, b: u32) {
            let ip = Ip::new(IpKey::host(IpAddr::V4(Ipv4Addr::from(a))), 0);
            prop_assert!(ip.contains(IpAddr::V4(Ipv4Addr::from(a))));
            prop_assert_eq!(ip.contains(IpAddr::V4(Ipv4Addr::from(b))), a == b);
        }

        #[test]
        fn range_contains_its_base(a: u128, prefix in 0u8..=128) {
            let base = IpAddr::V6(Ipv6Addr::from(a));
            let ip = Ip::new(IpKey::range(base, prefix), 0);
            prop_assert!(ip.contains(base));
        }
    }
}
