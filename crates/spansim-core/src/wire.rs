//! Simulated cables
//!
//! A wire is a topology edge whose two ends are each either a free-floating
//! point (an editing affordance) or a reference to a port. The end state is
//! a tagged sum type on purpose: there is no nullable-pointer "is it a real
//! port" convention anywhere in the core.

use serde::{Deserialize, Serialize};

use crate::types::PortRef;

// ----------------------------------------------------------------------------
// Wire End
// ----------------------------------------------------------------------------

/// One end of a wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum WireEnd {
    /// Dangling at a point on the canvas; not a link.
    Loose { x: f32, y: f32 },
    /// Attached to a port.
    Connected(PortRef),
}

impl WireEnd {
    /// The attached port, if this end is connected.
    pub fn connected_port(&self) -> Option<PortRef> {
        match self {
            WireEnd::Connected(port) => Some(*port),
            WireEnd::Loose { .. } => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Wire
// ----------------------------------------------------------------------------

/// A simulated cable between two wire ends.
///
/// Only a wire with both ends connected participates in relay; a wire with
/// any loose end is skipped by connectivity queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wire {
    ends: [WireEnd; 2],
}

impl Wire {
    pub fn new(end0: WireEnd, end1: WireEnd) -> Self {
        Self { ends: [end0, end1] }
    }

    /// Convenience constructor for a fully-connected wire.
    pub fn between(p0: PortRef, p1: PortRef) -> Self {
        Self::new(WireEnd::Connected(p0), WireEnd::Connected(p1))
    }

    pub fn ends(&self) -> &[WireEnd; 2] {
        &self.ends
    }

    pub(crate) fn end_mut(&mut self, index: usize) -> Option<&mut WireEnd> {
        self.ends.get_mut(index)
    }

    pub(crate) fn ends_mut(&mut self) -> &mut [WireEnd; 2] {
        &mut self.ends
    }

    /// Both connected ports, if neither end is loose.
    pub fn link(&self) -> Option<(PortRef, PortRef)> {
        match (self.ends[0].connected_port(), self.ends[1].connected_port()) {
            (Some(p0), Some(p1)) => Some((p0, p1)),
            _ => None,
        }
    }

    /// The opposite connected end, if `port` is one end of this wire and the
    /// other end is also connected.
    pub fn opposite(&self, port: PortRef) -> Option<PortRef> {
        let (p0, p1) = self.link()?;
        if p0 == port {
            Some(p1)
        } else if p1 == port {
            Some(p0)
        } else {
            None
        }
    }

    /// Whether either end is attached to `port`.
    pub fn touches(&self, port: PortRef) -> bool {
        self.ends.iter().any(|end| end.connected_port() == Some(port))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
