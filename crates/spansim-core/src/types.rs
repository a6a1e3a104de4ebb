//! Core types for the spansim virtual LAN
//!
//! This module defines the fundamental types used throughout the simulation,
//! using newtype patterns for semantic validation and type safety.

use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::errors::AddressError;

// ----------------------------------------------------------------------------
// MAC Address
// ----------------------------------------------------------------------------

/// A 48-bit MAC address.
///
/// Bridges carry a base address; each port derives its own address from it
/// (see [`MacAddr::offset`]). Relay loop suppression compares addresses
/// byte-exactly, so derivation must be reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MacAddr([u8; 6]);

/// The reserved spanning-tree protocol multicast address.
///
/// The only destination address the simulation core interprets; everything
/// else is opaque to it.
pub const PROTOCOL_MULTICAST: MacAddr = MacAddr([0x01, 0x80, 0xC2, 0x00, 0x00, 0x00]);

impl MacAddr {
    /// Create a new address from 6 bytes
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Add `n` to this address with carry propagation into higher-order
    /// bytes. Returns an error if the sum does not fit in 48 bits.
    pub fn offset(self, n: u64) -> Result<Self, AddressError> {
        let value = u64::from_be_bytes([0, 0, self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]]);
        let sum = value
            .checked_add(n)
            .filter(|v| *v <= 0x0000_FFFF_FFFF_FFFF)
            .ok_or(AddressError::Overflow { base: self, offset: n })?;
        let be = sum.to_be_bytes();
        Ok(Self([be[2], be[3], be[4], be[5], be[6], be[7]]))
    }

    /// Derive the address of port `index`: base + 1 + index.
    pub fn port_address(self, index: PortIndex) -> Result<Self, AddressError> {
        self.offset(1 + index.0 as u64)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept "aa:bb:cc:dd:ee:ff", "aa-bb-..", and bare "aabbccddeeff".
        let cleaned: String = s.chars().filter(|c| *c != ':' && *c != '-').collect();
        let bytes = hex::decode(&cleaned).map_err(|_| AddressError::Malformed(s.to_string()))?;
        if bytes.len() != 6 {
            return Err(AddressError::Malformed(s.to_string()));
        }
        let mut addr = [0u8; 6];
        addr.copy_from_slice(&bytes);
        Ok(Self(addr))
    }
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Millisecond timestamp since simulation start.
///
/// Stamped onto events by their poster (timer tasks, frame transmissions) so
/// that processing sees the time the event was raised, not drained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(u32);

impl Timestamp {
    /// Create a new timestamp
    pub const fn new(millis: u32) -> Self {
        Self(millis)
    }

    /// Get the raw milliseconds
    pub fn as_millis(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

// ----------------------------------------------------------------------------
// Identifiers
// ----------------------------------------------------------------------------

/// Identifier of a bridge within a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BridgeId(pub u32);

/// Identifier of a wire within a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WireId(pub u32);

/// Index of a port on its owning bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortIndex(pub u16);

/// A (bridge, port) pair identifying one port in the whole project.
///
/// Ports are owned exclusively by their bridge; the rest of the system refers
/// to them by value through this pair, never by pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    pub bridge: BridgeId,
    pub port: PortIndex,
}

impl PortRef {
    pub const fn new(bridge: BridgeId, port: PortIndex) -> Self {
        Self { bridge, port }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bridge {}, port {}", self.bridge.0, self.port.0)
    }
}

/// Index of a spanning tree instance (0 is the CIST).
pub type TreeIndex = usize;

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_carry_propagation() {
        let base = MacAddr::new([0x00, 0x10, 0x20, 0x30, 0x40, 0xFE]);
        assert_eq!(
            base.offset(3).unwrap(),
            MacAddr::new([0x00, 0x10, 0x20, 0x30, 0x41, 0x01])
        );

        let near_top = MacAddr::new([0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(
            near_top.offset(1).unwrap(),
            MacAddr::new([0x01, 0x00, 0x00, 0x00, 0x00, 0x00])
        );
    }

    #[test]
    fn test_offset_overflow_is_fatal() {
        let top = MacAddr::new([0xFF; 6]);
        assert!(top.offset(1).is_err());
        assert!(top.offset(0).is_ok());
    }

    #[test]
    fn test_port_address_derivation() {
        let base = MacAddr::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x10]);
        assert_eq!(
            base.port_address(PortIndex(0)).unwrap(),
            MacAddr::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x11])
        );
        assert_eq!(
            base.port_address(PortIndex(3)).unwrap(),
            MacAddr::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x14])
        );
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_display_parse_round_trip(bytes in any::<[u8; 6]>()) {
                let addr = MacAddr::new(bytes);
                let parsed: MacAddr = addr.to_string().parse().unwrap();
                prop_assert_eq!(parsed, addr);
            }

            #[test]
            fn prop_port_addresses_are_distinct(bytes in any::<[u8; 6]>(), count in 1usize..64) {
                let base = MacAddr::new(bytes);
                let derived: Result<Vec<_>, _> = (0..count)
                    .map(|i| base.port_address(PortIndex(i as u16)))
                    .collect();
                if let Ok(addrs) = derived {
                    for pair in addrs.windows(2) {
                        prop_assert!(pair[0] < pair[1]);
                    }
                    prop_assert!(!addrs.contains(&base));
                }
            }
        }
    }

    #[test]
    fn test_display_and_parse() {
        let addr = MacAddr::new([0x01, 0x80, 0xC2, 0x00, 0x00, 0x00]);
        assert_eq!(addr.to_string(), "01:80:c2:00:00:00");
        assert_eq!("01:80:C2:00:00:00".parse::<MacAddr>().unwrap(), addr);
        assert_eq!("0180c2000000".parse::<MacAddr>().unwrap(), addr);
        assert!("01:80:c2".parse::<MacAddr>().is_err());
        assert!("zz:80:c2:00:00:00".parse::<MacAddr>().is_err());
    }
}
