//! spansim core simulation model
//!
//! This crate owns the data model and algorithms of the virtual LAN: bridges
//! relaying protocol frames over wires, the loop guard that keeps floods
//! bounded, and the callback contract of the external spanning-tree engine.
//! It is deliberately free of any event loop: every operation is synchronous
//! and returns its outward effects, and `spansim-runtime` owns the single
//! dispatcher task that drains them in order.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod bridge;
pub mod channel;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod frame;
pub mod port;
pub mod topology;
pub mod types;
pub mod wire;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use bridge::{Bridge, Delivery, Outputs};
pub use config::{BridgeConfig, ChannelConfig};
pub use engine::{EngineFactory, EngineSink, StpEngine, StubEngine, TxBuffer, TxContext};
pub use errors::{CreationError, DispatchError, FrameError, Result, SimError, TopologyError};
pub use events::{AppEvent, BridgeStats, Command, Event, SimStats, StateReport};
pub use frame::Frame;
pub use port::{Port, PortRole};
pub use topology::{AddressDirectory, Topology};
pub use types::{BridgeId, MacAddr, PortIndex, PortRef, Timestamp, TreeIndex, WireId, PROTOCOL_MULTICAST};
pub use wire::{Wire, WireEnd};
