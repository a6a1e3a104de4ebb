//! Simulated frames and the protocol frame wire format
//!
//! The binary layout mirrors real 802.3 framing closely enough for the
//! protocol engine to stay oblivious to the simulation: destination and
//! source MAC addresses, a fixed switch/LLC framing block, then the opaque
//! BPDU payload handed to the engine verbatim.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::errors::FrameError;
use crate::types::{MacAddr, Timestamp, PROTOCOL_MULTICAST};

// ----------------------------------------------------------------------------
// Wire Format
// ----------------------------------------------------------------------------

/// Destination address offset/length: bytes[0..6].
const DEST_RANGE: core::ops::Range<usize> = 0..6;
/// Source address offset/length: bytes[6..12].
const SRC_RANGE: core::ops::Range<usize> = 6..12;

/// Shortest frame the relay will look at (both addresses present).
pub const MIN_FRAME_LEN: usize = 12;

/// Bytes of fixed switch/LLC framing between the source address and the
/// protocol payload: big-endian 802.3 length, LLC `42 42 03`, and ten
/// reserved zero bytes.
pub const SWITCH_FRAMING_LEN: usize = 15;

/// Offset of the protocol payload in a protocol frame.
pub const BPDU_PAYLOAD_OFFSET: usize = MIN_FRAME_LEN + SWITCH_FRAMING_LEN;

const LLC_DSAP: u8 = 0x42;
const LLC_SSAP: u8 = 0x42;
const LLC_CONTROL: u8 = 0x03;
const LLC_HEADER_LEN: usize = 3;

/// Build the byte image of an outgoing protocol frame: filled header, zeroed
/// payload area of `payload_len` bytes for the engine to write into.
pub fn protocol_frame_bytes(source: MacAddr, payload_len: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(BPDU_PAYLOAD_OFFSET + payload_len);
    bytes.extend_from_slice(PROTOCOL_MULTICAST.as_bytes());
    bytes.extend_from_slice(source.as_bytes());
    bytes.extend_from_slice(&((payload_len + LLC_HEADER_LEN) as u16).to_be_bytes());
    bytes.extend_from_slice(&[LLC_DSAP, LLC_SSAP, LLC_CONTROL]);
    bytes.resize(BPDU_PAYLOAD_OFFSET + payload_len, 0);
    bytes
}

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// A frame travelling through the simulated LAN.
///
/// `path` records the transmitting-port address of every relay hop in
/// traversal order. It exists purely for loop suppression while flooding
/// with a stopped engine; it never influences delivery addressing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    bytes: Vec<u8>,
    timestamp: Timestamp,
    path: SmallVec<[MacAddr; 4]>,
}

impl Frame {
    /// Wrap raw bytes into a frame. Rejects frames too short to carry both
    /// addresses; everything beyond that is somebody else's format.
    pub fn from_bytes(bytes: Vec<u8>, timestamp: Timestamp) -> Result<Self, FrameError> {
        if bytes.len() < MIN_FRAME_LEN {
            return Err(FrameError::TooShort { len: bytes.len(), min: MIN_FRAME_LEN });
        }
        Ok(Self { bytes, timestamp, path: SmallVec::new() })
    }

    /// Destination MAC address (bytes[0..6]).
    pub fn dest_mac(&self) -> MacAddr {
        let mut addr = [0u8; 6];
        addr.copy_from_slice(&self.bytes[DEST_RANGE]);
        MacAddr::new(addr)
    }

    /// Source MAC address (bytes[6..12]).
    pub fn src_mac(&self) -> MacAddr {
        let mut addr = [0u8; 6];
        addr.copy_from_slice(&self.bytes[SRC_RANGE]);
        MacAddr::new(addr)
    }

    /// Whether the destination is the reserved protocol multicast address.
    pub fn is_protocol(&self) -> bool {
        self.dest_mac() == PROTOCOL_MULTICAST
    }

    /// The opaque BPDU payload of a protocol frame, or `None` when the frame
    /// is too short to carry the fixed framing.
    pub fn bpdu_payload(&self) -> Option<&[u8]> {
        self.bytes.get(BPDU_PAYLOAD_OFFSET..)
    }

    /// Raw bytes of the frame.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Time the frame was transmitted or injected.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Addresses of the ports this frame has already been relayed through.
    pub fn path(&self) -> &[MacAddr] {
        &self.path
    }

    /// Record a relay hop through the port with `address`.
    pub fn record_hop(&mut self, address: MacAddr) {
        self.path.push(address);
    }

    /// Whether `path` already contains `address`.
    pub fn visited(&self, address: MacAddr) -> bool {
        self.path.contains(&address)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
