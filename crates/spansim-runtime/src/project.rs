//! The project: owner of every bridge and wire
//!
//! Answers the one connectivity question relay depends on, applies topology
//! edits, and routes deliveries into receive queues. All methods run on the
//! simulation task; nothing here is shared, locked, or asynchronous.

use std::collections::BTreeMap;

use rand::RngCore;
use tracing::debug;

use spansim_core::bridge::{Bridge, Delivery, Outputs};
use spansim_core::config::BridgeConfig;
use spansim_core::engine::EngineFactory;
use spansim_core::errors::{CreationError, TopologyError};
use spansim_core::events::{SimStats, StateReport, WireSnapshot};
use spansim_core::topology::{AddressDirectory, Topology};
use spansim_core::types::{BridgeId, MacAddr, Timestamp, WireId};
use spansim_core::wire::{Wire, WireEnd};

use crate::dispatcher::DispatcherHandle;
use crate::timer::{BridgeTimers, SimClock};

// ----------------------------------------------------------------------------
// Errors
// ----------------------------------------------------------------------------

/// Failures applying an edit to the project.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("unknown bridge {0:?}")]
    UnknownBridge(BridgeId),

    #[error(transparent)]
    Creation(#[from] CreationError),

    #[error(transparent)]
    Topology(#[from] TopologyError),
}

// ----------------------------------------------------------------------------
// Project
// ----------------------------------------------------------------------------

struct BridgeEntry {
    bridge: Bridge,
    timers: BridgeTimers,
}

/// All bridges and wires of one simulated LAN.
pub struct Project {
    topology: Topology,
    bridges: BTreeMap<BridgeId, BridgeEntry>,
    directory: AddressDirectory,
    next_bridge: u32,
}

impl Project {
    pub fn new() -> Self {
        Self {
            topology: Topology::new(),
            bridges: BTreeMap::new(),
            directory: AddressDirectory::new(),
            next_bridge: 0,
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn bridge(&self, id: BridgeId) -> Option<&Bridge> {
        self.bridges.get(&id).map(|entry| &entry.bridge)
    }

    pub fn bridge_ids(&self) -> Vec<BridgeId> {
        self.bridges.keys().copied().collect()
    }

    pub fn snapshot(&self, stats: SimStats) -> StateReport {
        StateReport {
            bridges: self.bridges.values().map(|entry| entry.bridge.snapshot()).collect(),
            wires: self
                .topology
                .wires()
                .map(|(id, wire)| WireSnapshot { id, ends: *wire.ends() })
                .collect(),
            stats,
        }
    }

    // ------------------------------------------------------------------
    // Bridge lifecycle
    // ------------------------------------------------------------------

    /// Create a bridge and start its timers.
    ///
    /// Failure at any step (address derivation, engine creation, timer
    /// service) is fatal to the construction and leaves no trace of the
    /// bridge anywhere.
    pub fn add_bridge(
        &mut self,
        config: &BridgeConfig,
        x: f32,
        y: f32,
        factory: &EngineFactory,
        rng: &mut dyn RngCore,
        handle: &DispatcherHandle,
        clock: &SimClock,
    ) -> Result<BridgeId, CreationError> {
        let id = BridgeId(self.next_bridge);
        let mut bridge = Bridge::new(id, config, factory, rng)?;
        bridge.set_location(x, y);
        let timers = BridgeTimers::start(&bridge, handle, clock)?;

        self.directory.insert(id, bridge.port_addresses());
        self.bridges.insert(id, BridgeEntry { bridge, timers });
        self.next_bridge += 1;
        Ok(id)
    }

    /// Destroy a bridge: cancel both timers first (so no later firing can
    /// post an event naming it), detach its wires, then discard the bridge
    /// with its queue and engine.
    pub fn remove_bridge(&mut self, id: BridgeId) -> Result<(), ProjectError> {
        let entry = self.bridges.remove(&id).ok_or(ProjectError::UnknownBridge(id))?;
        entry.timers.cancel();

        let (x, y) = entry.bridge.location();
        self.topology.detach_ports(x, y, |port| port.bridge == id);
        self.directory.remove(id);
        Ok(())
    }

    /// Rebuild a bridge with a new shape (port or MSTI count change).
    ///
    /// The replacement is fully constructed before the old bridge is
    /// released; on failure the old bridge keeps running untouched. The
    /// rebuilt bridge comes up with a fresh engine in the stopped state.
    pub fn rebuild_bridge(
        &mut self,
        id: BridgeId,
        config: &BridgeConfig,
        factory: &EngineFactory,
        rng: &mut dyn RngCore,
        handle: &DispatcherHandle,
        clock: &SimClock,
    ) -> Result<(), ProjectError> {
        let old = self.bridges.get(&id).ok_or(ProjectError::UnknownBridge(id))?;
        let (x, y) = old.bridge.location();

        let mut bridge = Bridge::new(id, config, factory, rng)?;
        bridge.set_location(x, y);
        let timers = BridgeTimers::start(&bridge, handle, clock)?;

        // Wires to ports that no longer exist dangle at the bridge.
        self.topology.detach_ports(x, y, |port| {
            port.bridge == id && (port.port.0 as usize) >= config.port_count
        });

        let addresses = bridge.port_addresses();
        if let Some(old) = self.bridges.insert(id, BridgeEntry { bridge, timers }) {
            old.timers.cancel();
        }
        self.directory.insert(id, addresses);
        Ok(())
    }

    /// Cancel every bridge's timers (simulation shutdown).
    pub fn cancel_all_timers(&self) {
        for entry in self.bridges.values() {
            entry.timers.cancel();
        }
    }

    // ------------------------------------------------------------------
    // Edits
    // ------------------------------------------------------------------

    pub fn add_wire(&mut self, end0: WireEnd, end1: WireEnd) -> Result<WireId, ProjectError> {
        Ok(self.topology.add_wire(Wire::new(end0, end1))?)
    }

    pub fn remove_wire(&mut self, wire: WireId) -> Result<(), ProjectError> {
        self.topology.remove_wire(wire)?;
        Ok(())
    }

    pub fn set_wire_end(&mut self, wire: WireId, end: usize, to: WireEnd) -> Result<(), ProjectError> {
        Ok(self.topology.set_wire_end(wire, end, to)?)
    }

    pub fn move_bridge(&mut self, id: BridgeId, x: f32, y: f32) -> Result<(), ProjectError> {
        let entry = self.bridges.get_mut(&id).ok_or(ProjectError::UnknownBridge(id))?;
        entry.bridge.set_location(x, y);
        Ok(())
    }

    pub fn set_address(&mut self, id: BridgeId, address: MacAddr) -> Result<(), ProjectError> {
        let entry = self.bridges.get_mut(&id).ok_or(ProjectError::UnknownBridge(id))?;
        entry.bridge.set_address(address)?;
        self.directory.insert(id, entry.bridge.port_addresses());
        Ok(())
    }

    // ------------------------------------------------------------------
    // Processing (delegated to the bridge with the right borrows split)
    // ------------------------------------------------------------------

    pub fn start_engine(&mut self, id: BridgeId, now: Timestamp) -> Option<Outputs> {
        let Self { topology, bridges, .. } = self;
        bridges.get_mut(&id).map(|entry| entry.bridge.start_engine(now, topology))
    }

    pub fn stop_engine(&mut self, id: BridgeId, now: Timestamp) -> Option<Outputs> {
        let Self { topology, bridges, .. } = self;
        bridges.get_mut(&id).map(|entry| entry.bridge.stop_engine(now, topology))
    }

    pub fn tick(&mut self, id: BridgeId, now: Timestamp) -> Option<Outputs> {
        let Self { topology, bridges, .. } = self;
        bridges.get_mut(&id).map(|entry| entry.bridge.on_tick(now, topology))
    }

    pub fn link_poll(&mut self, id: BridgeId, now: Timestamp) -> Option<Outputs> {
        let Self { topology, bridges, .. } = self;
        bridges.get_mut(&id).map(|entry| entry.bridge.on_link_poll(now, topology))
    }

    pub fn process_packet(&mut self, id: BridgeId) -> Option<Outputs> {
        let Self { topology, bridges, directory, .. } = self;
        bridges
            .get_mut(&id)
            .map(|entry| entry.bridge.process_one_pending(topology, directory))
    }

    /// Queue a delivered frame. Returns false when the destination bridge is
    /// gone, which the caller treats as stale traffic, not an error.
    pub fn enqueue_frame(&mut self, delivery: Delivery) -> bool {
        match self.bridges.get_mut(&delivery.dest.bridge) {
            Some(entry) => {
                entry.bridge.enqueue(delivery.dest.port, delivery.frame);
                true
            }
            None => {
                debug!(
                    bridge = delivery.dest.bridge.0,
                    port = delivery.dest.port.0,
                    reason = "bridge removed",
                    "dropping delivery",
                );
                false
            }
        }
    }
}

impl Default for Project {
    fn default() -> Self {
        Self::new()
    }
}
