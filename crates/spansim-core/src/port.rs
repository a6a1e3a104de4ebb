//! Bridge ports
//!
//! A port is a pure value object owned by its bridge. All mutation happens
//! through bridge operations or engine callbacks; the rendering layer only
//! ever sees read-only snapshots.

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::types::{MacAddr, PortIndex};

// ----------------------------------------------------------------------------
// Port Role
// ----------------------------------------------------------------------------

/// Spanning-tree role of a port, as last reported by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortRole {
    /// No role reported yet, or the engine is stopped.
    #[default]
    Disabled,
    Root,
    Designated,
    Alternate,
    Backup,
}

impl fmt::Display for PortRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortRole::Disabled => write!(f, "Disabled"),
            PortRole::Root => write!(f, "Root"),
            PortRole::Designated => write!(f, "Designated"),
            PortRole::Alternate => write!(f, "Alternate"),
            PortRole::Backup => write!(f, "Backup"),
        }
    }
}

// ----------------------------------------------------------------------------
// Port
// ----------------------------------------------------------------------------

/// An interface slot on a bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    index: PortIndex,
    address: MacAddr,
    /// Whether the simulated physical link is currently up.
    pub(crate) mac_operational: bool,
    /// CIST role as last reported through the engine callback.
    pub(crate) role: PortRole,
    pub(crate) learning: bool,
    pub(crate) forwarding: bool,
}

impl Port {
    pub(crate) fn new(index: PortIndex, address: MacAddr) -> Self {
        Self {
            index,
            address,
            mac_operational: false,
            role: PortRole::default(),
            learning: false,
            forwarding: false,
        }
    }

    /// Swap the derived address (base address change); link and protocol
    /// state are unaffected.
    pub(crate) fn set_address(&mut self, address: MacAddr) {
        self.address = address;
    }

    pub fn index(&self) -> PortIndex {
        self.index
    }

    /// Derived address: bridge base + 1 + index.
    pub fn address(&self) -> MacAddr {
        self.address
    }

    pub fn mac_operational(&self) -> bool {
        self.mac_operational
    }

    pub fn role(&self) -> PortRole {
        self.role
    }

    pub fn learning(&self) -> bool {
        self.learning
    }

    pub fn forwarding(&self) -> bool {
        self.forwarding
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_port_is_down() {
        let port = Port::new(PortIndex(2), MacAddr::new([2, 0, 0, 0, 0, 0x13]));
        assert_eq!(port.index(), PortIndex(2));
        assert!(!port.mac_operational());
        assert!(!port.learning());
        assert!(!port.forwarding());
        assert_eq!(port.role(), PortRole::Disabled);
    }
}
