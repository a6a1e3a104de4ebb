//! Topology: the wire set and its connectivity queries
//!
//! Topology sizes are small (tens of nodes), so the single connectivity
//! query the relay algorithm depends on is a linear scan; an index would buy
//! nothing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::TopologyError;
use crate::types::{BridgeId, MacAddr, PortRef, WireId};
use crate::wire::{Wire, WireEnd};

// ----------------------------------------------------------------------------
// Topology
// ----------------------------------------------------------------------------

/// The set of wires in a project.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Topology {
    wires: BTreeMap<WireId, Wire>,
    next_wire: u32,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a wire. Each connected end must attach to a port that is not the
    /// connected end of any existing wire.
    pub fn add_wire(&mut self, wire: Wire) -> Result<WireId, TopologyError> {
        for end in wire.ends() {
            if let Some(port) = end.connected_port() {
                if self.wire_at(port).is_some() {
                    return Err(TopologyError::PortOccupied(port));
                }
            }
        }
        let id = WireId(self.next_wire);
        self.next_wire += 1;
        self.wires.insert(id, wire);
        Ok(id)
    }

    pub fn remove_wire(&mut self, id: WireId) -> Result<Wire, TopologyError> {
        self.wires.remove(&id).ok_or(TopologyError::UnknownWire(id))
    }

    /// Re-point one end of an existing wire (drag in the editor).
    pub fn set_wire_end(&mut self, id: WireId, end: usize, to: WireEnd) -> Result<(), TopologyError> {
        if let Some(port) = to.connected_port() {
            if self.wire_at(port).is_some_and(|occupied| occupied != id) {
                return Err(TopologyError::PortOccupied(port));
            }
        }
        let wire = self.wires.get_mut(&id).ok_or(TopologyError::UnknownWire(id))?;
        if let Some(slot) = wire.end_mut(end) {
            *slot = to;
        }
        Ok(())
    }

    pub fn wire(&self, id: WireId) -> Option<&Wire> {
        self.wires.get(&id)
    }

    pub fn wires(&self) -> impl Iterator<Item = (WireId, &Wire)> {
        self.wires.iter().map(|(id, wire)| (*id, wire))
    }

    /// The port currently connected to `port`, if any.
    ///
    /// Only a wire with both ends connected counts as a link; a wire with a
    /// loose end is an editing affordance and is skipped here. Symmetric by
    /// construction: if this returns `q` for `p`, it returns `p` for `q`.
    pub fn find_connected(&self, port: PortRef) -> Option<PortRef> {
        self.wires.values().find_map(|wire| wire.opposite(port))
    }

    /// The wire one of whose ends is attached to `port`, if any.
    pub fn wire_at(&self, port: PortRef) -> Option<WireId> {
        self.wires
            .iter()
            .find(|(_, wire)| wire.touches(port))
            .map(|(id, _)| *id)
    }

    /// Detach every wire end attached to a port matching `detach`, leaving
    /// the end loose at `(x, y)`. Used when a bridge is removed or shrunk.
    pub fn detach_ports(&mut self, x: f32, y: f32, detach: impl Fn(PortRef) -> bool) {
        for wire in self.wires.values_mut() {
            for end in wire.ends_mut() {
                if end.connected_port().is_some_and(&detach) {
                    *end = WireEnd::Loose { x, y };
                }
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Address Directory
// ----------------------------------------------------------------------------

/// Port addresses owned by each live bridge.
///
/// The relay loop guard asks whether a frame's path already contains an
/// address owned by a candidate peer's bridge; this directory answers that
/// without reaching into the bridge itself (which may be mutably borrowed at
/// the time).
#[derive(Debug, Default, Clone)]
pub struct AddressDirectory {
    addresses: BTreeMap<BridgeId, Vec<MacAddr>>,
}

impl AddressDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or replace) the port addresses owned by `bridge`.
    pub fn insert(&mut self, bridge: BridgeId, addresses: Vec<MacAddr>) {
        self.addresses.insert(bridge, addresses);
    }

    pub fn remove(&mut self, bridge: BridgeId) {
        self.addresses.remove(&bridge);
    }

    /// Whether `address` is one of `bridge`'s port addresses.
    pub fn owns(&self, bridge: BridgeId, address: MacAddr) -> bool {
        self.addresses
            .get(&bridge)
            .is_some_and(|owned| owned.contains(&address))
    }

    /// Whether any address in `path` belongs to `bridge`.
    pub fn any_owned_by(&self, bridge: BridgeId, path: &[MacAddr]) -> bool {
        path.iter().any(|address| self.owns(bridge, *address))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PortIndex;

    fn port(bridge: u32, index: u16) -> PortRef {
        PortRef::new(BridgeId(bridge), PortIndex(index))
    }

    #[test]
    fn test_find_connected_symmetry() {
        let mut topology = Topology::new();
        topology.add_wire(Wire::between(port(1, 0), port(2, 0))).unwrap();

        assert_eq!(topology.find_connected(port(1, 0)), Some(port(2, 0)));
        assert_eq!(topology.find_connected(port(2, 0)), Some(port(1, 0)));
        assert_eq!(topology.find_connected(port(3, 0)), None);
    }

    #[test]
    fn test_loose_end_yields_none_from_both_ends() {
        let mut topology = Topology::new();
        topology
            .add_wire(Wire::new(
                WireEnd::Connected(port(1, 0)),
                WireEnd::Loose { x: 0.0, y: 0.0 },
            ))
            .unwrap();

        assert_eq!(topology.find_connected(port(1, 0)), None);
    }

    #[test]
    fn test_port_occupied_rejected() {
        let mut topology = Topology::new();
        topology.add_wire(Wire::between(port(1, 0), port(2, 0))).unwrap();

        let err = topology.add_wire(Wire::between(port(1, 0), port(3, 0))).unwrap_err();
        assert!(matches!(err, TopologyError::PortOccupied(p) if p == port(1, 0)));
    }

    #[test]
    fn test_set_wire_end_connects_and_occupies() {
        let mut topology = Topology::new();
        let id = topology
            .add_wire(Wire::new(
                WireEnd::Connected(port(1, 0)),
                WireEnd::Loose { x: 5.0, y: 5.0 },
            ))
            .unwrap();

        topology.set_wire_end(id, 1, WireEnd::Connected(port(2, 0))).unwrap();
        assert_eq!(topology.find_connected(port(1, 0)), Some(port(2, 0)));

        // Moving an end onto its own current port is a no-op, not a conflict.
        topology.set_wire_end(id, 1, WireEnd::Connected(port(2, 0))).unwrap();
    }

    #[test]
    fn test_detach_ports() {
        let mut topology = Topology::new();
        topology.add_wire(Wire::between(port(1, 0), port(2, 0))).unwrap();
        topology.add_wire(Wire::between(port(1, 1), port(3, 0))).unwrap();

        topology.detach_ports(1.5, 2.5, |p| p.bridge == BridgeId(1));

        assert_eq!(topology.find_connected(port(2, 0)), None);
        assert_eq!(topology.find_connected(port(3, 0)), None);
        // The far ends stay attached.
        assert!(topology.wire_at(port(2, 0)).is_some());
    }

    #[test]
    fn test_address_directory_ownership() {
        let mut directory = AddressDirectory::new();
        let a = MacAddr::new([2, 0, 0, 0, 0, 0x11]);
        let b = MacAddr::new([2, 0, 0, 0, 0, 0x12]);
        directory.insert(BridgeId(1), vec![a, b]);

        assert!(directory.owns(BridgeId(1), a));
        assert!(!directory.owns(BridgeId(2), a));
        assert!(directory.any_owned_by(BridgeId(1), &[MacAddr::new([9; 6]), b]));
        assert!(!directory.any_owned_by(BridgeId(1), &[MacAddr::new([9; 6])]));
    }
}
