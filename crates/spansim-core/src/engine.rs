//! The spanning-tree protocol engine contract
//!
//! The engine itself is an external component consumed as an opaque box; the
//! simulation only knows the surface below. Calls flow both ways: the bridge
//! drives the engine through [`StpEngine`], and the engine reaches back into
//! the bridge through the fixed callback table [`EngineSink`] passed into
//! every state-changing entry point.
//!
//! The C-style table's `alloc`/`free` members have no equivalent here:
//! transmit buffers are owned values ([`TxBuffer`]) that the engine receives
//! from `transmit_get_buffer` and gives back to `transmit_release_buffer`.

use tracing::debug;

use crate::config::BridgeConfig;
use crate::errors::CreationError;
use crate::frame::BPDU_PAYLOAD_OFFSET;
use crate::port::PortRole;
use crate::types::{MacAddr, PortIndex, PortRef, Timestamp, TreeIndex};

// ----------------------------------------------------------------------------
// Transmit Buffers
// ----------------------------------------------------------------------------

/// Where a pending transmission is going.
///
/// Carried inside the buffer itself and threaded by the engine from
/// `transmit_get_buffer` into `transmit_release_buffer`, so there is no
/// bridge-level "one exchange in flight" scratch state to get confused by a
/// reentrant engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxContext {
    /// Port the engine is transmitting out of.
    pub tx_port: PortRef,
    /// Port at the far end of the wire.
    pub rx_port: PortRef,
    /// Time the transmission was requested.
    pub timestamp: Timestamp,
}

/// An outgoing protocol frame under construction.
///
/// The header (destination multicast, source port address, switch/LLC
/// framing) is already filled in; the engine writes its BPDU into
/// [`TxBuffer::payload_mut`] and releases the buffer.
#[derive(Debug)]
pub struct TxBuffer {
    ctx: TxContext,
    bytes: Vec<u8>,
}

impl TxBuffer {
    pub(crate) fn new(ctx: TxContext, bytes: Vec<u8>) -> Self {
        Self { ctx, bytes }
    }

    pub fn context(&self) -> TxContext {
        self.ctx
    }

    /// The payload area reserved for the BPDU.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[BPDU_PAYLOAD_OFFSET..]
    }

    pub(crate) fn into_parts(self) -> (TxContext, Vec<u8>) {
        (self.ctx, self.bytes)
    }
}

// ----------------------------------------------------------------------------
// Callback Table (engine -> bridge)
// ----------------------------------------------------------------------------

/// The fixed callback table the engine calls back through.
///
/// Implemented by the bridge for the duration of one engine entry-point
/// call; the engine never retains it.
pub trait EngineSink {
    /// The engine wants `port` to learn (or stop learning) addresses on `tree`.
    fn enable_learning(&mut self, port: PortIndex, tree: TreeIndex, enable: bool);

    /// The engine wants `port` to forward (or stop forwarding) on `tree`.
    fn enable_forwarding(&mut self, port: PortIndex, tree: TreeIndex, enable: bool);

    /// Request a buffer for transmitting a BPDU of `payload_len` bytes out
    /// of `port`. Returns `None` when nothing is connected there, the
    /// moral equivalent of an unplugged cable. Not an error.
    fn transmit_get_buffer(
        &mut self,
        port: PortIndex,
        payload_len: usize,
        timestamp: Timestamp,
    ) -> Option<TxBuffer>;

    /// Hand back a filled buffer for delivery.
    fn transmit_release_buffer(&mut self, buffer: TxBuffer);

    /// Flush the filtering database entries learned on `port` for `tree`.
    fn flush_fdb(&mut self, port: PortIndex, tree: TreeIndex);

    /// Free-form diagnostics from the engine.
    fn debug_log(&mut self, message: &str);

    /// The engine detected a topology change on `tree`.
    fn on_topology_change(&mut self, tree: TreeIndex);

    /// `port` changed role on `tree`.
    fn on_port_role_changed(&mut self, port: PortIndex, tree: TreeIndex, role: PortRole);

    /// Some engine configuration changed.
    fn on_config_changed(&mut self);
}

// ----------------------------------------------------------------------------
// Engine Surface (bridge -> engine)
// ----------------------------------------------------------------------------

/// The consumed surface of the external protocol engine.
pub trait StpEngine: Send + std::fmt::Debug {
    /// Whether the protocol is running on this bridge.
    fn is_started(&self) -> bool;

    fn start(&mut self, sink: &mut dyn EngineSink, now: Timestamp);

    fn stop(&mut self, sink: &mut dyn EngineSink, now: Timestamp);

    /// One-second protocol tick. Only called while started.
    fn one_second_tick(&mut self, sink: &mut dyn EngineSink, now: Timestamp);

    /// `port`'s simulated link came up.
    fn port_enabled(
        &mut self,
        sink: &mut dyn EngineSink,
        port: PortIndex,
        speed_mbps: u32,
        point_to_point: bool,
        now: Timestamp,
    );

    /// `port`'s simulated link went down.
    fn port_disabled(&mut self, sink: &mut dyn EngineSink, port: PortIndex, now: Timestamp);

    /// A BPDU arrived on `port`. The payload is the engine's own format and
    /// is passed through verbatim.
    fn bpdu_received(
        &mut self,
        sink: &mut dyn EngineSink,
        port: PortIndex,
        payload: &[u8],
        now: Timestamp,
    );

    fn bridge_address(&self) -> MacAddr;

    fn set_bridge_address(&mut self, address: MacAddr);

    fn port_count(&self) -> usize;

    fn msti_count(&self) -> usize;
}

/// Creates the engine instance for a bridge being constructed. Failure is
/// fatal to the construction.
pub type EngineFactory =
    Box<dyn Fn(&BridgeConfig) -> Result<Box<dyn StpEngine>, CreationError> + Send>;

// ----------------------------------------------------------------------------
// Stub Engine
// ----------------------------------------------------------------------------

/// BPDU payload size the stub transmits.
pub const STUB_BPDU_LEN: usize = 36;

/// A minimal engine used by tests and the demo CLI.
///
/// It is not a spanning-tree implementation: every enabled port is treated
/// as designated/forwarding and a hello BPDU goes out of each on every tick.
/// That is enough to exercise the whole callback contract; the real MSTP
/// engine drops in behind the same trait.
#[derive(Debug)]
pub struct StubEngine {
    address: MacAddr,
    msti_count: usize,
    started: bool,
    port_up: Vec<bool>,
    bpdus_received: u64,
}

impl StubEngine {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            address: config.address,
            msti_count: config.msti_count,
            started: false,
            port_up: vec![false; config.port_count],
            bpdus_received: 0,
        }
    }

    /// An [`EngineFactory`] producing stub engines.
    pub fn factory() -> EngineFactory {
        Box::new(|config| Ok(Box::new(StubEngine::new(config)) as Box<dyn StpEngine>))
    }

    /// BPDUs handed to this engine so far.
    pub fn bpdus_received(&self) -> u64 {
        self.bpdus_received
    }

    /// Whether the engine believes `port`'s link is up.
    pub fn port_up(&self, port: PortIndex) -> bool {
        self.port_up.get(port.0 as usize).copied().unwrap_or(false)
    }

    fn send_hello(&self, sink: &mut dyn EngineSink, port: PortIndex, now: Timestamp) {
        let Some(mut buffer) = sink.transmit_get_buffer(port, STUB_BPDU_LEN, now) else {
            // Unplugged cable; nothing to do.
            return;
        };
        let payload = buffer.payload_mut();
        payload[0] = 0x00; // protocol id
        payload[1] = 0x00;
        payload[2] = 0x02; // version: rapid
        payload[3] = 0x02; // type: rapid hello
        payload[4..10].copy_from_slice(self.address.as_bytes());
        payload[10..12].copy_from_slice(&port.0.to_be_bytes());
        sink.transmit_release_buffer(buffer);
    }
}

impl StpEngine for StubEngine {
    fn is_started(&self) -> bool {
        self.started
    }

    fn start(&mut self, sink: &mut dyn EngineSink, _now: Timestamp) {
        self.started = true;
        sink.debug_log("stub engine started");
        for index in 0..self.port_up.len() {
            if self.port_up[index] {
                let port = PortIndex(index as u16);
                sink.on_port_role_changed(port, 0, PortRole::Designated);
                sink.enable_learning(port, 0, true);
                sink.enable_forwarding(port, 0, true);
            }
        }
        sink.on_config_changed();
    }

    fn stop(&mut self, sink: &mut dyn EngineSink, _now: Timestamp) {
        self.started = false;
        sink.debug_log("stub engine stopped");
        for index in 0..self.port_up.len() {
            let port = PortIndex(index as u16);
            sink.on_port_role_changed(port, 0, PortRole::Disabled);
            sink.enable_learning(port, 0, false);
            sink.enable_forwarding(port, 0, false);
        }
        sink.on_config_changed();
    }

    fn one_second_tick(&mut self, sink: &mut dyn EngineSink, now: Timestamp) {
        for index in 0..self.port_up.len() {
            if self.port_up[index] {
                self.send_hello(sink, PortIndex(index as u16), now);
            }
        }
    }

    fn port_enabled(
        &mut self,
        sink: &mut dyn EngineSink,
        port: PortIndex,
        speed_mbps: u32,
        point_to_point: bool,
        _now: Timestamp,
    ) {
        if let Some(up) = self.port_up.get_mut(port.0 as usize) {
            *up = true;
        }
        debug!(port = port.0, speed_mbps, point_to_point, "stub engine: port enabled");
        if self.started {
            sink.on_port_role_changed(port, 0, PortRole::Designated);
            sink.enable_learning(port, 0, true);
            sink.enable_forwarding(port, 0, true);
        }
    }

    fn port_disabled(&mut self, sink: &mut dyn EngineSink, port: PortIndex, _now: Timestamp) {
        if let Some(up) = self.port_up.get_mut(port.0 as usize) {
            *up = false;
        }
        debug!(port = port.0, "stub engine: port disabled");
        if self.started {
            sink.on_port_role_changed(port, 0, PortRole::Disabled);
            sink.enable_learning(port, 0, false);
            sink.enable_forwarding(port, 0, false);
            sink.flush_fdb(port, 0);
        }
    }

    fn bpdu_received(
        &mut self,
        sink: &mut dyn EngineSink,
        port: PortIndex,
        payload: &[u8],
        _now: Timestamp,
    ) {
        self.bpdus_received += 1;
        sink.debug_log(&format!("bpdu on port {} ({} bytes)", port.0, payload.len()));
    }

    fn bridge_address(&self) -> MacAddr {
        self.address
    }

    fn set_bridge_address(&mut self, address: MacAddr) {
        self.address = address;
    }

    fn port_count(&self) -> usize {
        self.port_up.len()
    }

    fn msti_count(&self) -> usize {
        self.msti_count
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::protocol_frame_bytes;
    use crate::types::BridgeId;

    /// Sink that records every callback and hands out buffers for a fixed
    /// pair of ports wired back-to-back.
    #[derive(Default)]
    struct RecordingSink {
        released: Vec<Vec<u8>>,
        logs: Vec<String>,
        role_changes: Vec<(PortIndex, PortRole)>,
    }

    impl EngineSink for RecordingSink {
        fn enable_learning(&mut self, _port: PortIndex, _tree: TreeIndex, _enable: bool) {}

        fn enable_forwarding(&mut self, _port: PortIndex, _tree: TreeIndex, _enable: bool) {}

        fn transmit_get_buffer(
            &mut self,
            port: PortIndex,
            payload_len: usize,
            timestamp: Timestamp,
        ) -> Option<TxBuffer> {
            let tx_port = PortRef::new(BridgeId(1), port);
            let rx_port = PortRef::new(BridgeId(2), port);
            let source = MacAddr::new([0x02, 0, 0, 0, 0, 0x11]);
            Some(TxBuffer::new(
                TxContext { tx_port, rx_port, timestamp },
                protocol_frame_bytes(source, payload_len),
            ))
        }

        fn transmit_release_buffer(&mut self, buffer: TxBuffer) {
            let (_, bytes) = buffer.into_parts();
            self.released.push(bytes);
        }

        fn flush_fdb(&mut self, _port: PortIndex, _tree: TreeIndex) {}

        fn debug_log(&mut self, message: &str) {
            self.logs.push(message.to_string());
        }

        fn on_topology_change(&mut self, _tree: TreeIndex) {}

        fn on_port_role_changed(&mut self, port: PortIndex, _tree: TreeIndex, role: PortRole) {
            self.role_changes.push((port, role));
        }

        fn on_config_changed(&mut self) {}
    }

    fn stub() -> StubEngine {
        let config = BridgeConfig::new(MacAddr::new([0x02, 0, 0, 0, 0, 0x10]), 2, 0);
        StubEngine::new(&config)
    }

    #[test]
    fn test_stub_lifecycle() {
        let mut engine = stub();
        let mut sink = RecordingSink::default();

        assert!(!engine.is_started());
        engine.start(&mut sink, Timestamp::new(0));
        assert!(engine.is_started());
        assert!(sink.logs.iter().any(|line| line.contains("started")));

        engine.port_enabled(&mut sink, PortIndex(0), 100, true, Timestamp::new(10));
        assert!(engine.port_up(PortIndex(0)));
        assert!(!engine.port_up(PortIndex(1)));
        assert!(sink
            .role_changes
            .contains(&(PortIndex(0), PortRole::Designated)));

        engine.port_disabled(&mut sink, PortIndex(0), Timestamp::new(20));
        assert!(!engine.port_up(PortIndex(0)));

        engine.stop(&mut sink, Timestamp::new(30));
        assert!(!engine.is_started());
    }

    #[test]
    fn test_stub_tick_sends_hello_per_up_port() {
        let mut engine = stub();
        let mut sink = RecordingSink::default();

        engine.start(&mut sink, Timestamp::new(0));
        engine.port_enabled(&mut sink, PortIndex(0), 100, true, Timestamp::new(0));
        engine.port_enabled(&mut sink, PortIndex(1), 100, true, Timestamp::new(0));

        engine.one_second_tick(&mut sink, Timestamp::new(1000));

        assert_eq!(sink.released.len(), 2);
        for bytes in &sink.released {
            assert_eq!(bytes.len(), crate::frame::BPDU_PAYLOAD_OFFSET + STUB_BPDU_LEN);
            // The hello payload names the transmitting bridge.
            assert_eq!(
                &bytes[crate::frame::BPDU_PAYLOAD_OFFSET + 4..crate::frame::BPDU_PAYLOAD_OFFSET + 10],
                engine.bridge_address().as_bytes(),
            );
        }
    }

    #[test]
    fn test_stub_counts_received_bpdus() {
        let mut engine = stub();
        let mut sink = RecordingSink::default();

        engine.start(&mut sink, Timestamp::new(0));
        engine.bpdu_received(&mut sink, PortIndex(1), &[0u8; 36], Timestamp::new(50));
        engine.bpdu_received(&mut sink, PortIndex(1), &[0u8; 36], Timestamp::new(60));

        assert_eq!(engine.bpdus_received(), 2);
        assert!(sink.logs.iter().any(|line| line.contains("bpdu on port 1")));
    }
}
