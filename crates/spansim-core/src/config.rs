//! Configuration types for the simulation core

use core::ops::RangeInclusive;
use serde::{Deserialize, Serialize};

use crate::errors::CreationError;
use crate::types::MacAddr;

// ----------------------------------------------------------------------------
// Limits and Timer Ranges
// ----------------------------------------------------------------------------

/// Most ports a single bridge may carry.
pub const MAX_PORT_COUNT: usize = 1024;

/// Most spanning tree instances an engine may be created with (beyond the CIST).
pub const MAX_MSTI_COUNT: usize = 64;

/// Range the per-bridge one-second tick timer period is drawn from, in
/// milliseconds. Deliberately randomized per bridge so simulated bridges
/// never tick in perfect lockstep, which would mask race-order bugs in the
/// protocol engine.
pub const TICK_PERIOD_MS: RangeInclusive<u64> = 950..=1049;

/// Range the per-bridge link poll timer period is drawn from, in milliseconds.
pub const POLL_PERIOD_MS: RangeInclusive<u64> = 45..=54;

// ----------------------------------------------------------------------------
// Bridge Configuration
// ----------------------------------------------------------------------------

/// Construction-time parameters of a bridge.
///
/// Fixed at creation; the reconfiguration commands replace the port list and
/// engine wholesale rather than mutating a live configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Base MAC address; port addresses derive from it.
    pub address: MacAddr,
    /// Number of ports.
    pub port_count: usize,
    /// Number of spanning tree instances beyond the CIST.
    pub msti_count: usize,
}

impl BridgeConfig {
    pub fn new(address: MacAddr, port_count: usize, msti_count: usize) -> Self {
        Self { address, port_count, msti_count }
    }

    /// Validate the configuration, mirroring the checks the engine itself
    /// would reject at creation time.
    pub fn validate(&self) -> Result<(), CreationError> {
        if self.port_count == 0 || self.port_count > MAX_PORT_COUNT {
            return Err(CreationError::InvalidPortCount(self.port_count));
        }
        if self.msti_count > MAX_MSTI_COUNT {
            return Err(CreationError::InvalidMstiCount(self.msti_count));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Buffer sizes for the dispatcher channels.
///
/// The event channel is unbounded (the simulation posts packet-available
/// events to itself while draining) and therefore has no entry here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Commands from the editing/rendering layer to the simulation.
    pub command_buffer_size: usize,
    /// App events from the simulation back to the rendering layer.
    pub app_event_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 32,
            app_event_buffer_size: 128,
        }
    }
}

impl ChannelConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.command_buffer_size == 0 {
            return Err("command_buffer_size must be non-zero".to_string());
        }
        if self.app_event_buffer_size == 0 {
            return Err("app_event_buffer_size must be non-zero".to_string());
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
