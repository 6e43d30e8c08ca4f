use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{NetworkError, Result};

/// An IPv4 network in CIDR notation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    network: Ipv4Addr,
    prefix_len: u8,
}

impl Subnet {
    /// Build a subnet; host bits of `addr` are masked off
    ///
    /// # Errors
    ///
    /// Returns `InvalidSubnet` if `prefix_len` exceeds 32.
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> Result<Self> {
        if prefix_len > 32 {
            return Err(NetworkError::InvalidSubnet {
                subnet: format!("{}/{}", addr, prefix_len),
                reason: "prefix length must be at most 32".to_string(),
            });
        }
        let network = Ipv4Addr::from(u32::from(addr) & mask(prefix_len));
        Ok(Self {
            network,
            prefix_len,
        })
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Highest address of the subnet
    pub fn last(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) | !mask(self.prefix_len))
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & mask(self.prefix_len) == u32::from(self.network)
    }
}

fn mask(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix_len))
    }
}

impl FromStr for Subnet {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| NetworkError::InvalidSubnet {
            subnet: s.to_string(),
            reason: reason.to_string(),
        };
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| invalid("expected <address>/<prefix length>"))?;
        let addr = Ipv4Addr::from_str(addr.trim()).map_err(|_| invalid("bad IPv4 address"))?;
        let prefix_len = prefix
            .trim()
            .parse::<u8>()
            .map_err(|_| invalid("bad prefix length"))?;
        Subnet::new(addr, prefix_len)
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

/// Hands out addresses of one subnet
///
/// Allocation scans upward from the first address after the network address
/// through the last address of the subnet and takes the lowest free one.
/// An address only becomes free again through [`release`](Self::release);
/// reserved addresses never do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeIpAddrTracker {
    subnet: Subnet,
    reserved: BTreeSet<Ipv4Addr>,
    taken: BTreeSet<Ipv4Addr>,
}

impl FreeIpAddrTracker {
    pub fn new(subnet: Subnet) -> Self {
        Self {
            subnet,
            reserved: BTreeSet::new(),
            taken: BTreeSet::new(),
        }
    }

    /// Tracker with addresses that must never be handed out (e.g. the gateway)
    ///
    /// Reserved addresses outside the subnet are ignored.
    pub fn with_reserved(subnet: Subnet, reserved: impl IntoIterator<Item = Ipv4Addr>) -> Self {
        let reserved = reserved
            .into_iter()
            .filter(|addr| subnet.contains(*addr))
            .collect();
        Self {
            subnet,
            reserved,
            taken: BTreeSet::new(),
        }
    }

    pub fn subnet(&self) -> Subnet {
        self.subnet
    }

    /// # Errors
    ///
    /// Returns `AddressSpaceExhausted` when every candidate address is taken.
    pub fn allocate(&mut self) -> Result<Ipv4Addr> {
        let first = u32::from(self.subnet.network()).saturating_add(1);
        let last = u32::from(self.subnet.last());

        // a /32 has no address after the network address
        if u32::from(self.subnet.network()) == last {
            return Err(self.exhausted());
        }

        let free = (first..=last)
            .map(Ipv4Addr::from)
            .find(|addr| !self.is_taken(*addr))
            .ok_or_else(|| self.exhausted())?;
        self.taken.insert(free);
        Ok(free)
    }

    /// Return an address to the pool; releasing a free or reserved address
    /// does nothing
    pub fn release(&mut self, addr: Ipv4Addr) {
        self.taken.remove(&addr);
    }

    pub fn is_taken(&self, addr: Ipv4Addr) -> bool {
        self.reserved.contains(&addr) || self.taken.contains(&addr)
    }

    fn exhausted(&self) -> NetworkError {
        NetworkError::AddressSpaceExhausted {
            subnet: self.subnet.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subnet(s: &str) -> Subnet {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_masks_host_bits() {
        let s = subnet("10.1.2.3/16");
        assert_eq!(s.network(), Ipv4Addr::new(10, 1, 0, 0));
        assert_eq!(s.last(), Ipv4Addr::new(10, 1, 255, 255));
        assert_eq!(s.to_string(), "10.1.0.0/16");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("10.0.0.0".parse::<Subnet>().is_err());
        assert!("10.0.0.0/33".parse::<Subnet>().is_err());
        assert!("nope/8".parse::<Subnet>().is_err());
    }

    #[test]
    fn test_allocation_starts_after_network_address() {
        let mut tracker = FreeIpAddrTracker::new(subnet("192.168.0.0/30"));
        assert_eq!(tracker.allocate().unwrap(), Ipv4Addr::new(192, 168, 0, 1));
        assert_eq!(tracker.allocate().unwrap(), Ipv4Addr::new(192, 168, 0, 2));
        // last address of the subnet is handed out too
        assert_eq!(tracker.allocate().unwrap(), Ipv4Addr::new(192, 168, 0, 3));
        assert!(matches!(
            tracker.allocate(),
            Err(NetworkError::AddressSpaceExhausted { .. })
        ));
    }

    #[test]
    fn test_reserved_addresses_are_skipped() {
        let mut tracker = FreeIpAddrTracker::with_reserved(
            subnet("172.23.0.0/16"),
            [Ipv4Addr::new(172, 23, 0, 1), Ipv4Addr::new(8, 8, 8, 8)],
        );
        assert_eq!(tracker.allocate().unwrap(), Ipv4Addr::new(172, 23, 0, 2));
    }

    #[test]
    fn test_releasing_a_reserved_address_keeps_it_reserved() {
        let gateway = Ipv4Addr::new(10, 0, 0, 1);
        let mut tracker = FreeIpAddrTracker::with_reserved(subnet("10.0.0.0/24"), [gateway]);

        tracker.release(gateway);

        assert!(tracker.is_taken(gateway));
        assert_eq!(tracker.allocate().unwrap(), Ipv4Addr::new(10, 0, 0, 2));
    }

    #[test]
    fn test_release_makes_address_reusable() {
        let mut tracker = FreeIpAddrTracker::new(subnet("10.0.0.0/24"));
        let a = tracker.allocate().unwrap();
        let _b = tracker.allocate().unwrap();
        tracker.release(a);
        assert_eq!(tracker.allocate().unwrap(), a);
    }

    #[test]
    fn test_release_unknown_is_noop() {
        let mut tracker = FreeIpAddrTracker::new(subnet("10.0.0.0/24"));
        let before = tracker.clone();
        tracker.release(Ipv4Addr::new(10, 0, 0, 77));
        assert_eq!(tracker, before);
    }

    #[test]
    fn test_single_host_subnet_is_exhausted() {
        let mut tracker = FreeIpAddrTracker::new(subnet("10.0.0.5/32"));
        assert!(tracker.allocate().is_err());
    }
}
