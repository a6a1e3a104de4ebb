//! Typed communication protocol of the simulation
//!
//! All interaction with the simulation flows through these message types:
//! commands from the editing/rendering layer in, events from timers and
//! transmissions in, app events back out to whoever is rendering. Nothing
//! outside the simulation task ever touches bridge/port/wire state directly.

use serde::{Deserialize, Serialize};

use crate::config::BridgeConfig;
use crate::port::PortRole;
use crate::types::{BridgeId, MacAddr, PortIndex, Timestamp, TreeIndex, WireId};
use crate::wire::WireEnd;

// ----------------------------------------------------------------------------
// Command: editing layer -> simulation
// ----------------------------------------------------------------------------

/// Commands from the editing/rendering layer.
///
/// The core accepts these without validating UI concerns; a command that
/// cannot be applied surfaces as [`AppEvent::Error`], never as a panic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    /// Create a bridge at a canvas location.
    AddBridge { config: BridgeConfig, x: f32, y: f32 },
    /// Destroy a bridge: cancel its timers, then discard queue and engine.
    RemoveBridge { bridge: BridgeId },
    /// Add a wire; ends may be loose.
    AddWire { end0: WireEnd, end1: WireEnd },
    /// Remove a wire.
    RemoveWire { wire: WireId },
    /// Re-point one end (0 or 1) of an existing wire.
    SetWireEnd { wire: WireId, end: usize, to: WireEnd },
    /// Move a bridge on the canvas.
    Move { bridge: BridgeId, x: f32, y: f32 },
    /// Change a bridge's base address (port addresses re-derive).
    SetAddress { bridge: BridgeId, address: MacAddr },
    /// Start the spanning-tree protocol on a bridge.
    StartEngine { bridge: BridgeId },
    /// Stop the spanning-tree protocol on a bridge.
    StopEngine { bridge: BridgeId },
    /// Rebuild a bridge with a different port count.
    SetPortCount { bridge: BridgeId, port_count: usize },
    /// Rebuild a bridge's engine with a different MSTI count.
    SetMstiCount { bridge: BridgeId, msti_count: usize },
    /// Hand a raw frame to a bridge as if it arrived on `port`.
    InjectFrame { bridge: BridgeId, port: PortIndex, bytes: Vec<u8> },
    /// Request a full state snapshot via [`AppEvent::StateReport`].
    GetState,
    /// Stop the simulation loop.
    Shutdown,
}

// ----------------------------------------------------------------------------
// Event: timers and transmissions -> simulation
// ----------------------------------------------------------------------------

/// Events posted into the dispatcher.
///
/// Timer tasks and cross-bridge transmissions are only ever allowed to post
/// these; the dispatcher drains them one at a time on the simulation task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// A bridge's one-second protocol tick fired.
    Tick { bridge: BridgeId, timestamp: Timestamp },
    /// A bridge's link poll timer fired.
    LinkPoll { bridge: BridgeId, timestamp: Timestamp },
    /// A bridge has at least one frame queued (one event per enqueue).
    PacketAvailable { bridge: BridgeId },
}

impl Event {
    /// The bridge this event is addressed to.
    pub fn bridge(&self) -> BridgeId {
        match self {
            Event::Tick { bridge, .. }
            | Event::LinkPoll { bridge, .. }
            | Event::PacketAvailable { bridge } => *bridge,
        }
    }
}

// ----------------------------------------------------------------------------
// AppEvent: simulation -> rendering layer
// ----------------------------------------------------------------------------

/// State-change notifications for the rendering layer.
///
/// Purely informational; the simulation never waits on their consumption
/// (sends are non-blocking, and a slow renderer drops rather than stalls).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AppEvent {
    /// A bridge was created.
    BridgeAdded { bridge: BridgeId },
    /// A bridge was destroyed.
    BridgeRemoved { bridge: BridgeId },
    /// A wire was created.
    WireAdded { wire: WireId },
    /// A wire was removed.
    WireRemoved { wire: WireId },
    /// Something about a bridge changed; redraw it.
    Invalidated { bridge: BridgeId },
    /// A port changed spanning-tree role.
    PortRoleChanged { bridge: BridgeId, port: PortIndex, tree: TreeIndex, role: PortRole },
    /// The engine detected a topology change.
    TopologyChanged { bridge: BridgeId, tree: TreeIndex },
    /// Engine configuration changed.
    ConfigChanged { bridge: BridgeId },
    /// A diagnostic line from a bridge's engine.
    EngineLog { bridge: BridgeId, line: String },
    /// A frame circled back onto an already-used path and was not relayed
    /// out of one edge. Rendered as a warning, not an error.
    LoopSuppressed { bridge: BridgeId, port: PortIndex },
    /// Reply to [`Command::GetState`].
    StateReport(StateReport),
    /// A command could not be applied.
    Error { message: String },
}

// ----------------------------------------------------------------------------
// Snapshots
// ----------------------------------------------------------------------------

/// Read-only view of one port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortSnapshot {
    pub index: PortIndex,
    pub address: MacAddr,
    pub mac_operational: bool,
    pub role: PortRole,
    pub learning: bool,
    pub forwarding: bool,
}

/// Per-bridge counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeStats {
    pub ticks: u64,
    pub bpdus_delivered: u64,
    pub frames_relayed: u64,
    pub frames_dropped: u64,
    pub loops_suppressed: u64,
}

/// Read-only view of one bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSnapshot {
    pub id: BridgeId,
    pub address: MacAddr,
    pub started: bool,
    pub x: f32,
    pub y: f32,
    pub ports: Vec<PortSnapshot>,
    pub stats: BridgeStats,
}

/// Read-only view of one wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireSnapshot {
    pub id: WireId,
    pub ends: [WireEnd; 2],
}

/// Simulation-wide counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimStats {
    pub commands_processed: u64,
    pub events_processed: u64,
    /// Events that named a bridge removed before they drained.
    pub stale_events: u64,
    /// App events dropped because the rendering side was not keeping up.
    pub app_events_dropped: u64,
}

/// Full state snapshot for the rendering layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateReport {
    pub bridges: Vec<BridgeSnapshot>,
    pub wires: Vec<WireSnapshot>,
    pub stats: SimStats,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_bridge_accessor() {
        let event = Event::Tick { bridge: BridgeId(3), timestamp: Timestamp::new(1000) };
        assert_eq!(event.bridge(), BridgeId(3));

        let event = Event::PacketAvailable { bridge: BridgeId(7) };
        assert_eq!(event.bridge(), BridgeId(7));
    }
}
