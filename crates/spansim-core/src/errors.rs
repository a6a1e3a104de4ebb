//! Error types for the spansim core
//!
//! Construction-time resource failures are the only errors that propagate to
//! callers; steady-state relay and tick processing is defensive and logs
//! instead (a dangling link or a suppressed loop is expected traffic, not an
//! error).

use crate::types::{MacAddr, PortRef, WireId};

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Address arithmetic errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AddressError {
    #[error("address {base} + {offset} overflows the 48-bit address space")]
    Overflow { base: MacAddr, offset: u64 },
    #[error("malformed MAC address: {0:?}")]
    Malformed(String),
}

/// Fatal bridge-construction failures.
///
/// Any of these leaves no partially-constructed bridge reachable: the caller
/// observes the error synchronously and nothing was registered anywhere.
#[derive(Debug, thiserror::Error)]
pub enum CreationError {
    #[error("protocol engine creation failed: {reason}")]
    Engine { reason: String },

    #[error("timer service unavailable: {reason}")]
    Timer { reason: String },

    #[error("port address space exhausted: {0}")]
    AddressSpaceExhausted(#[from] AddressError),

    #[error("invalid port count {0}")]
    InvalidPortCount(usize),

    #[error("invalid msti count {0} (max {})", crate::config::MAX_MSTI_COUNT)]
    InvalidMstiCount(usize),
}

/// Malformed simulated frames.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FrameError {
    #[error("frame too short: {len} bytes (need at least {min})")]
    TooShort { len: usize, min: usize },
}

/// Topology edit failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TopologyError {
    #[error("port already wired: {0}")]
    PortOccupied(PortRef),

    #[error("unknown wire {0:?}")]
    UnknownWire(WireId),
}

/// Channel failures observed by posters.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    #[error("dispatcher is gone; event dropped")]
    Closed,
}

// ----------------------------------------------------------------------------
// Unified Error Type
// ----------------------------------------------------------------------------

/// Core error type for the spansim simulation.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("bridge creation failed: {0}")]
    Creation(#[from] CreationError),

    #[error("invalid frame: {0}")]
    Frame(#[from] FrameError),

    #[error("topology error: {0}")]
    Topology(#[from] TopologyError),

    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("configuration error: {reason}")]
    Configuration { reason: String },
}

impl SimError {
    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        SimError::Configuration { reason: reason.into() }
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, SimError>;

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
