//! IPv4 address allocation for bridge-mode containers.
//!
//! Tracks every host address of the bridge subnet in a bitmap so that two
//! live containers never receive the same address.

use std::net::Ipv4Addr;

use burrow_common::error::{BurrowError, Result};
use burrow_common::types::Ipv4Subnet;

const MIN_PREFIX: u8 = 8;
const MAX_PREFIX: u8 = 30;

/// Bitmap allocator over one subnet.
#[derive(Debug, Clone)]
pub struct Ipam {
    subnet: Ipv4Subnet,
    gateway: Ipv4Addr,
    bits: Vec<u64>,
    allocated: usize,
}

impl Ipam {
    /// Creates an allocator with the network, broadcast, and gateway
    /// addresses reserved.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the prefix is outside /8../30 or the gateway
    /// lies outside the subnet.
    pub fn new(subnet: Ipv4Subnet, gateway: Ipv4Addr) -> Result<Self> {
        if !(MIN_PREFIX..=MAX_PREFIX).contains(&subnet.prefix_len()) {
            return Err(BurrowError::Config {
                message: format!("bridge subnet {subnet} must be between /{MIN_PREFIX} and /{MAX_PREFIX}"),
            });
        }
        if !subnet.contains(gateway) {
            return Err(BurrowError::Config {
                message: format!("gateway {gateway} is outside {subnet}"),
            });
        }
        let words = usize::try_from(subnet.size().div_ceil(64)).unwrap_or(usize::MAX);
        let mut ipam = Self {
            subnet,
            gateway,
            bits: vec![0; words],
            allocated: 0,
        };
        let _ = ipam.mark(subnet.network());
        let _ = ipam.mark(subnet.broadcast());
        let _ = ipam.mark(gateway);
        ipam.allocated = 0;
        Ok(ipam)
    }

    /// Returns the lowest free address.
    ///
    /// # Errors
    ///
    /// Returns `NetworkSetup` when the subnet is exhausted.
    pub fn allocate(&mut self) -> Result<Ipv4Addr> {
        let (word_idx, word) = self
            .bits
            .iter()
            .enumerate()
            .find(|(_, w)| **w != u64::MAX)
            .ok_or_else(|| self.exhausted())?;
        let offset = word_idx as u64 * 64 + u64::from(word.trailing_ones());
        if offset >= self.subnet.size() {
            return Err(self.exhausted());
        }
        let addr = self.addr_at(offset);
        let _ = self.mark(addr);
        tracing::debug!(%addr, "address allocated");
        Ok(addr)
    }

    /// Marks `addr` as in use. Returns `false` if it already was.
    ///
    /// Used to restore allocations of containers loaded from disk.
    ///
    /// # Errors
    ///
    /// Returns `NetworkSetup` if `addr` is outside the subnet.
    pub fn reserve(&mut self, addr: Ipv4Addr) -> Result<bool> {
        if !self.subnet.contains(addr) {
            return Err(BurrowError::NetworkSetup {
                message: format!("{addr} is outside {}", self.subnet),
            });
        }
        Ok(self.mark(addr))
    }

    /// Returns `addr` to the pool. Reserved and foreign addresses are ignored.
    pub fn release(&mut self, addr: Ipv4Addr) {
        if !self.subnet.contains(addr) || self.is_reserved(addr) {
            return;
        }
        let (word, bit) = self.position(addr);
        if self.bits[word] & bit != 0 {
            self.bits[word] &= !bit;
            self.allocated -= 1;
            tracing::debug!(%addr, "address released");
        }
    }

    /// Returns whether `addr` is currently allocated or reserved.
    #[must_use]
    pub fn is_used(&self, addr: Ipv4Addr) -> bool {
        if !self.subnet.contains(addr) {
            return false;
        }
        let (word, bit) = self.position(addr);
        self.bits[word] & bit != 0
    }

    /// Number of addresses handed out to containers.
    #[must_use]
    pub const fn allocated(&self) -> usize {
        self.allocated
    }

    fn is_reserved(&self, addr: Ipv4Addr) -> bool {
        addr == self.subnet.network() || addr == self.subnet.broadcast() || addr == self.gateway
    }

    fn mark(&mut self, addr: Ipv4Addr) -> bool {
        let (word, bit) = self.position(addr);
        if self.bits[word] & bit != 0 {
            return false;
        }
        self.bits[word] |= bit;
        self.allocated += 1;
        true
    }

    fn position(&self, addr: Ipv4Addr) -> (usize, u64) {
        let offset = u32::from(addr) - u32::from(self.subnet.network());
        ((offset / 64) as usize, 1u64 << (offset % 64))
    }

    fn addr_at(&self, offset: u64) -> Ipv4Addr {
        #[allow(clippy::cast_possible_truncation)]
        Ipv4Addr::from(u32::from(self.subnet.network()) + offset as u32)
    }

    fn exhausted(&self) -> BurrowError {
        BurrowError::NetworkSetup {
            message: format!("no free addresses left in {}", self.subnet),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subnet(s: &str) -> Ipv4Subnet {
        s.parse().expect("subnet")
    }

    #[test]
    fn first_allocation_skips_network_and_gateway() {
        let mut ipam = Ipam::new(subnet("172.17.0.0/16"), Ipv4Addr::new(172, 17, 0, 1)).unwrap();
        assert_eq!(ipam.allocate().unwrap(), Ipv4Addr::new(172, 17, 0, 2));
        assert_eq!(ipam.allocate().unwrap(), Ipv4Addr::new(172, 17, 0, 3));
        assert_eq!(ipam.allocated(), 2);
    }

    #[test]
    fn allocations_never_collide() {
        let mut ipam = Ipam::new(subnet("10.0.0.0/24"), Ipv4Addr::new(10, 0, 0, 1)).unwrap();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            assert!(seen.insert(ipam.allocate().unwrap()));
        }
    }

    #[test]
    fn released_address_is_reused() {
        let mut ipam = Ipam::new(subnet("10.0.0.0/24"), Ipv4Addr::new(10, 0, 0, 1)).unwrap();
        let a = ipam.allocate().unwrap();
        let _b = ipam.allocate().unwrap();
        ipam.release(a);
        assert!(!ipam.is_used(a));
        assert_eq!(ipam.allocate().unwrap(), a);
        ipam.release(Ipv4Addr::new(10, 0, 0, 1));
        assert!(ipam.is_used(Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[test]
    fn small_subnet_exhausts_without_handing_out_broadcast() {
        // /30: network .0, gateway .1, host .2, broadcast .3
        let mut ipam = Ipam::new(subnet("10.0.0.0/30"), Ipv4Addr::new(10, 0, 0, 1)).unwrap();
        assert_eq!(ipam.allocate().unwrap(), Ipv4Addr::new(10, 0, 0, 2));
        let err = ipam.allocate().unwrap_err();
        assert!(matches!(err, BurrowError::NetworkSetup { .. }));
    }

    #[test]
    fn reserve_restores_existing_allocation() {
        let mut ipam = Ipam::new(subnet("10.0.0.0/24"), Ipv4Addr::new(10, 0, 0, 1)).unwrap();
        assert!(ipam.reserve(Ipv4Addr::new(10, 0, 0, 2)).unwrap());
        assert!(!ipam.reserve(Ipv4Addr::new(10, 0, 0, 2)).unwrap());
        assert_eq!(ipam.allocate().unwrap(), Ipv4Addr::new(10, 0, 0, 3));
        assert!(ipam.reserve(Ipv4Addr::new(192, 168, 0, 1)).is_err());
    }

    #[test]
    fn rejects_gateway_outside_subnet_and_tiny_prefixes() {
        assert!(Ipam::new(subnet("10.0.0.0/24"), Ipv4Addr::new(10, 0, 1, 1)).is_err());
        assert!(Ipam::new(subnet("10.0.0.0/31"), Ipv4Addr::new(10, 0, 0, 1)).is_err());
    }
}
