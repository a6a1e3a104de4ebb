//! Bridges: the simulated switches
//!
//! A bridge owns its ports, its receive queue, and one opaque protocol
//! engine instance. Every operation here is synchronous and returns its
//! outward effects (frames to deliver to other bridges, app events for the
//! rendering layer) explicitly, so that the single simulation task can
//! apply them in order. Nothing in this module blocks, locks, or spawns.

use std::collections::VecDeque;
use std::time::Duration;

use rand::{Rng, RngCore};
use tracing::debug;

use crate::config::{BridgeConfig, POLL_PERIOD_MS, TICK_PERIOD_MS};
use crate::engine::{EngineFactory, EngineSink, StpEngine, TxBuffer, TxContext};
use crate::errors::CreationError;
use crate::events::{AppEvent, BridgeSnapshot, BridgeStats, PortSnapshot};
use crate::frame::{protocol_frame_bytes, Frame};
use crate::port::{Port, PortRole};
use crate::topology::{AddressDirectory, Topology};
use crate::types::{BridgeId, MacAddr, PortIndex, PortRef, Timestamp};

/// Link speed reported for every simulated wire, in Mb/s.
const LINK_SPEED_MBPS: u32 = 100;

// ----------------------------------------------------------------------------
// Outputs
// ----------------------------------------------------------------------------

/// A frame bound for another bridge's receive queue.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub dest: PortRef,
    pub frame: Frame,
}

/// The outward effects of one bridge operation.
#[derive(Debug, Default)]
pub struct Outputs {
    pub deliveries: Vec<Delivery>,
    pub app_events: Vec<AppEvent>,
}

// ----------------------------------------------------------------------------
// Bridge
// ----------------------------------------------------------------------------

/// A simulated switch: ports plus one protocol engine instance.
#[derive(Debug)]
pub struct Bridge {
    id: BridgeId,
    address: MacAddr,
    x: f32,
    y: f32,
    ports: Vec<Port>,
    engine: Box<dyn StpEngine>,
    rx_queue: VecDeque<(PortIndex, Frame)>,
    tick_period: Duration,
    poll_period: Duration,
    stats: BridgeStats,
}

impl Bridge {
    /// Construct a bridge.
    ///
    /// Derives one address per port from the base address (fatal if that
    /// runs off the end of the address space), creates the engine through
    /// `factory` (fatal on failure), and draws both timer periods from
    /// `rng`. On error nothing of the bridge remains reachable.
    pub fn new(
        id: BridgeId,
        config: &BridgeConfig,
        factory: &EngineFactory,
        rng: &mut dyn RngCore,
    ) -> Result<Self, CreationError> {
        config.validate()?;

        let mut ports = Vec::with_capacity(config.port_count);
        for index in 0..config.port_count {
            let index = PortIndex(index as u16);
            ports.push(Port::new(index, config.address.port_address(index)?));
        }

        let engine = factory(config)?;

        Ok(Self {
            id,
            address: config.address,
            x: 0.0,
            y: 0.0,
            ports,
            engine,
            rx_queue: VecDeque::new(),
            tick_period: Duration::from_millis(rng.gen_range(TICK_PERIOD_MS)),
            poll_period: Duration::from_millis(rng.gen_range(POLL_PERIOD_MS)),
            stats: BridgeStats::default(),
        })
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn id(&self) -> BridgeId {
        self.id
    }

    pub fn address(&self) -> MacAddr {
        self.address
    }

    pub fn location(&self) -> (f32, f32) {
        (self.x, self.y)
    }

    pub fn set_location(&mut self, x: f32, y: f32) {
        self.x = x;
        self.y = y;
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn port(&self, index: PortIndex) -> Option<&Port> {
        self.ports.get(index.0 as usize)
    }

    /// All derived port addresses, in port order.
    pub fn port_addresses(&self) -> Vec<MacAddr> {
        self.ports.iter().map(|port| port.address()).collect()
    }

    pub fn started(&self) -> bool {
        self.engine.is_started()
    }

    /// Construction-time shape of this bridge (used to rebuild it).
    pub fn config(&self) -> BridgeConfig {
        BridgeConfig::new(self.address, self.ports.len(), self.engine.msti_count())
    }

    /// Randomized one-second tick period drawn at construction.
    pub fn tick_period(&self) -> Duration {
        self.tick_period
    }

    /// Randomized link poll period drawn at construction.
    pub fn poll_period(&self) -> Duration {
        self.poll_period
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    pub fn queue_len(&self) -> usize {
        self.rx_queue.len()
    }

    /// The frame at the front of the receive queue, if any.
    pub fn peek_pending(&self) -> Option<(PortIndex, &Frame)> {
        self.rx_queue.front().map(|(port, frame)| (*port, frame))
    }

    pub fn snapshot(&self) -> BridgeSnapshot {
        BridgeSnapshot {
            id: self.id,
            address: self.address,
            started: self.started(),
            x: self.x,
            y: self.y,
            ports: self
                .ports
                .iter()
                .map(|port| PortSnapshot {
                    index: port.index(),
                    address: port.address(),
                    mac_operational: port.mac_operational(),
                    role: port.role(),
                    learning: port.learning(),
                    forwarding: port.forwarding(),
                })
                .collect(),
            stats: self.stats,
        }
    }

    // ------------------------------------------------------------------
    // External mutation
    // ------------------------------------------------------------------

    /// Change the base address, re-deriving every port address.
    ///
    /// Checked before applied: on overflow the bridge is left untouched.
    pub fn set_address(&mut self, address: MacAddr) -> Result<(), CreationError> {
        let mut derived = Vec::with_capacity(self.ports.len());
        for port in &self.ports {
            derived.push(address.port_address(port.index())?);
        }
        for (port, addr) in self.ports.iter_mut().zip(derived) {
            port.set_address(addr);
        }
        self.address = address;
        self.engine.set_bridge_address(address);
        Ok(())
    }

    /// Queue a frame for this bridge. The caller is responsible for posting
    /// exactly one packet-available event per enqueue.
    pub fn enqueue(&mut self, port: PortIndex, frame: Frame) {
        self.rx_queue.push_back((port, frame));
    }

    // ------------------------------------------------------------------
    // Engine lifecycle
    // ------------------------------------------------------------------

    /// Start the protocol engine and replay link state for ports that were
    /// already up before the engine was listening.
    pub fn start_engine(&mut self, now: Timestamp, topology: &Topology) -> Outputs {
        let mut out = Outputs::default();
        if self.engine.is_started() {
            debug!(bridge = self.id.0, "engine already started");
            return out;
        }

        let mut sink = BridgeSink::new(self.id, &mut self.ports, &mut self.stats, topology, &mut out);
        self.engine.start(&mut sink, now);

        let up: Vec<PortIndex> = self
            .ports
            .iter()
            .filter(|port| port.mac_operational())
            .map(|port| port.index())
            .collect();
        for index in up {
            let mut sink =
                BridgeSink::new(self.id, &mut self.ports, &mut self.stats, topology, &mut out);
            self.engine.port_enabled(&mut sink, index, LINK_SPEED_MBPS, true, now);
        }

        out.app_events.push(AppEvent::Invalidated { bridge: self.id });
        out
    }

    /// Stop the protocol engine.
    pub fn stop_engine(&mut self, now: Timestamp, topology: &Topology) -> Outputs {
        let mut out = Outputs::default();
        if !self.engine.is_started() {
            debug!(bridge = self.id.0, "engine already stopped");
            return out;
        }

        let mut sink = BridgeSink::new(self.id, &mut self.ports, &mut self.stats, topology, &mut out);
        self.engine.stop(&mut sink, now);
        out.app_events.push(AppEvent::Invalidated { bridge: self.id });
        out
    }

    // ------------------------------------------------------------------
    // Timer-driven processing
    // ------------------------------------------------------------------

    /// One-second protocol tick. No-op unless the engine is started.
    pub fn on_tick(&mut self, now: Timestamp, topology: &Topology) -> Outputs {
        let mut out = Outputs::default();
        if !self.engine.is_started() {
            return out;
        }
        self.stats.ticks += 1;
        let mut sink = BridgeSink::new(self.id, &mut self.ports, &mut self.stats, topology, &mut out);
        self.engine.one_second_tick(&mut sink, now);
        out
    }

    /// Link poll: recompute each port's connectivity and tell the engine
    /// about transitions.
    pub fn on_link_poll(&mut self, now: Timestamp, topology: &Topology) -> Outputs {
        let mut out = Outputs::default();

        let transitions: Vec<(PortIndex, bool)> = self
            .ports
            .iter()
            .filter_map(|port| {
                let connected =
                    topology.find_connected(PortRef::new(self.id, port.index())).is_some();
                (connected != port.mac_operational()).then_some((port.index(), connected))
            })
            .collect();

        for (index, up) in transitions {
            if let Some(port) = self.ports.get_mut(index.0 as usize) {
                port.mac_operational = up;
            }
            debug!(bridge = self.id.0, port = index.0, up, "link state changed");

            if self.engine.is_started() {
                let mut sink =
                    BridgeSink::new(self.id, &mut self.ports, &mut self.stats, topology, &mut out);
                if up {
                    self.engine.port_enabled(&mut sink, index, LINK_SPEED_MBPS, true, now);
                } else {
                    self.engine.port_disabled(&mut sink, index, now);
                }
            }

            out.app_events.push(AppEvent::Invalidated { bridge: self.id });
        }

        out
    }

    // ------------------------------------------------------------------
    // Frame processing
    // ------------------------------------------------------------------

    /// Pop and process the front of the receive queue.
    ///
    /// Protocol-multicast frames go to the engine when it is running and are
    /// flooded when it is not; anything else is not this core's to interpret
    /// and is dropped.
    pub fn process_one_pending(
        &mut self,
        topology: &Topology,
        directory: &AddressDirectory,
    ) -> Outputs {
        let mut out = Outputs::default();

        let Some((rx_port, frame)) = self.rx_queue.pop_front() else {
            debug!(bridge = self.id.0, "packet event with empty queue");
            return out;
        };

        if !frame.is_protocol() {
            debug!(
                bridge = self.id.0,
                dest = %frame.dest_mac(),
                reason = "not protocol multicast",
                "dropping frame",
            );
            self.stats.frames_dropped += 1;
            return out;
        }

        if self.engine.is_started() {
            self.deliver_bpdu(rx_port, frame, topology, &mut out);
        } else {
            self.flood(rx_port, &frame, topology, directory, &mut out);
        }

        out
    }

    /// Hand a BPDU to the running engine, first healing the receiving
    /// port's link state if it went stale (a frame arriving is proof the
    /// link is up).
    fn deliver_bpdu(
        &mut self,
        rx_port: PortIndex,
        frame: Frame,
        topology: &Topology,
        out: &mut Outputs,
    ) {
        let stale = self
            .port(rx_port)
            .is_some_and(|port| !port.mac_operational());
        if stale {
            if let Some(port) = self.ports.get_mut(rx_port.0 as usize) {
                port.mac_operational = true;
            }
            let mut sink = BridgeSink::new(self.id, &mut self.ports, &mut self.stats, topology, out);
            self.engine.port_enabled(&mut sink, rx_port, LINK_SPEED_MBPS, true, frame.timestamp());
            out.app_events.push(AppEvent::Invalidated { bridge: self.id });
        }

        let Some(payload) = frame.bpdu_payload() else {
            debug!(
                bridge = self.id.0,
                len = frame.as_bytes().len(),
                reason = "truncated protocol frame",
                "dropping frame",
            );
            self.stats.frames_dropped += 1;
            return;
        };

        self.stats.bpdus_delivered += 1;
        let mut sink = BridgeSink::new(self.id, &mut self.ports, &mut self.stats, topology, out);
        self.engine.bpdu_received(&mut sink, rx_port, payload, frame.timestamp());
    }

    /// Flood a protocol frame out of every other port (engine stopped).
    ///
    /// An edge is skipped when the frame's path already holds an address
    /// owned by the peer's bridge: that is the loop guard doing its job, not
    /// an error. A true cycle still carries each frame all the way around
    /// once, which the rendering layer shows as a warning.
    fn flood(
        &mut self,
        rx_port: PortIndex,
        frame: &Frame,
        topology: &Topology,
        directory: &AddressDirectory,
        out: &mut Outputs,
    ) {
        for index in 0..self.ports.len() {
            let tx_index = PortIndex(index as u16);
            if tx_index == rx_port {
                continue;
            }

            let Some(peer) = topology.find_connected(PortRef::new(self.id, tx_index)) else {
                continue;
            };

            if directory.any_owned_by(peer.bridge, frame.path()) {
                self.stats.loops_suppressed += 1;
                debug!(
                    bridge = self.id.0,
                    port = tx_index.0,
                    peer = peer.bridge.0,
                    "loop suppressed; not relaying out this edge",
                );
                out.app_events.push(AppEvent::LoopSuppressed { bridge: self.id, port: tx_index });
                continue;
            }

            let mut relayed = frame.clone();
            relayed.record_hop(self.ports[index].address());
            self.stats.frames_relayed += 1;
            out.deliveries.push(Delivery { dest: peer, frame: relayed });
        }
    }
}

// ----------------------------------------------------------------------------
// Engine Callback Adapter
// ----------------------------------------------------------------------------

/// The bridge's implementation of the engine callback table.
///
/// Short-lived: constructed around one engine entry-point call, borrowing
/// the bridge's ports and the operation's output buffers.
struct BridgeSink<'a> {
    bridge: BridgeId,
    ports: &'a mut Vec<Port>,
    stats: &'a mut BridgeStats,
    topology: &'a Topology,
    out: &'a mut Outputs,
}

impl<'a> BridgeSink<'a> {
    fn new(
        bridge: BridgeId,
        ports: &'a mut Vec<Port>,
        stats: &'a mut BridgeStats,
        topology: &'a Topology,
        out: &'a mut Outputs,
    ) -> Self {
        Self { bridge, ports, stats, topology, out }
    }
}

impl EngineSink for BridgeSink<'_> {
    fn enable_learning(&mut self, port: PortIndex, tree: usize, enable: bool) {
        debug!(bridge = self.bridge.0, port = port.0, tree, enable, "enable learning");
        if tree == 0 {
            if let Some(port) = self.ports.get_mut(port.0 as usize) {
                port.learning = enable;
            }
        }
        self.out.app_events.push(AppEvent::Invalidated { bridge: self.bridge });
    }

    fn enable_forwarding(&mut self, port: PortIndex, tree: usize, enable: bool) {
        debug!(bridge = self.bridge.0, port = port.0, tree, enable, "enable forwarding");
        if tree == 0 {
            if let Some(port) = self.ports.get_mut(port.0 as usize) {
                port.forwarding = enable;
            }
        }
        self.out.app_events.push(AppEvent::Invalidated { bridge: self.bridge });
    }

    fn transmit_get_buffer(
        &mut self,
        port: PortIndex,
        payload_len: usize,
        timestamp: Timestamp,
    ) -> Option<TxBuffer> {
        let tx_port = PortRef::new(self.bridge, port);
        let Some(rx_port) = self.topology.find_connected(tx_port) else {
            // Unplugged cable: the transmission silently goes nowhere.
            debug!(
                bridge = self.bridge.0,
                port = port.0,
                reason = "no connected peer",
                "dropping transmission",
            );
            return None;
        };
        let source = self.ports.get(port.0 as usize)?.address();
        let bytes = protocol_frame_bytes(source, payload_len);
        Some(TxBuffer::new(TxContext { tx_port, rx_port, timestamp }, bytes))
    }

    fn transmit_release_buffer(&mut self, buffer: TxBuffer) {
        let (ctx, bytes) = buffer.into_parts();
        let mut frame = match Frame::from_bytes(bytes, ctx.timestamp) {
            Ok(frame) => frame,
            Err(err) => {
                debug!(bridge = self.bridge.0, %err, "released buffer is not a frame");
                self.stats.frames_dropped += 1;
                return;
            }
        };
        if let Some(port) = self.ports.get(ctx.tx_port.port.0 as usize) {
            frame.record_hop(port.address());
        }
        self.out.deliveries.push(Delivery { dest: ctx.rx_port, frame });
    }

    fn flush_fdb(&mut self, port: PortIndex, tree: usize) {
        debug!(bridge = self.bridge.0, port = port.0, tree, "flush fdb");
        self.out.app_events.push(AppEvent::Invalidated { bridge: self.bridge });
    }

    fn debug_log(&mut self, message: &str) {
        debug!(bridge = self.bridge.0, "{message}");
        self.out
            .app_events
            .push(AppEvent::EngineLog { bridge: self.bridge, line: message.to_string() });
    }

    fn on_topology_change(&mut self, tree: usize) {
        self.out.app_events.push(AppEvent::TopologyChanged { bridge: self.bridge, tree });
    }

    fn on_port_role_changed(&mut self, port: PortIndex, tree: usize, role: PortRole) {
        if tree == 0 {
            if let Some(port) = self.ports.get_mut(port.0 as usize) {
                port.role = role;
            }
        }
        self.out
            .app_events
            .push(AppEvent::PortRoleChanged { bridge: self.bridge, port, tree, role });
        self.out.app_events.push(AppEvent::Invalidated { bridge: self.bridge });
    }

    fn on_config_changed(&mut self) {
        self.out.app_events.push(AppEvent::ConfigChanged { bridge: self.bridge });
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StubEngine;
    use crate::frame::BPDU_PAYLOAD_OFFSET;
    use crate::wire::Wire;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn base_addr(tag: u8) -> MacAddr {
        MacAddr::new([0x02, 0x00, 0x00, 0x00, tag, 0x00])
    }

    fn make_bridge(id: u32, tag: u8, port_count: usize) -> Bridge {
        let config = BridgeConfig::new(base_addr(tag), port_count, 0);
        let factory = StubEngine::factory();
        let mut rng = ChaCha8Rng::seed_from_u64(id as u64);
        Bridge::new(BridgeId(id), &config, &factory, &mut rng).unwrap()
    }

    fn register(directory: &mut AddressDirectory, bridge: &Bridge) {
        directory.insert(bridge.id(), bridge.port_addresses());
    }

    fn protocol_frame(src: MacAddr) -> Frame {
        Frame::from_bytes(protocol_frame_bytes(src, 8), Timestamp::new(100)).unwrap()
    }

    #[test]
    fn test_timer_periods_drawn_from_ranges() {
        for seed in 0..64u32 {
            let bridge = make_bridge(seed, 1, 2);
            let tick = bridge.tick_period().as_millis() as u64;
            let poll = bridge.poll_period().as_millis() as u64;
            assert!(TICK_PERIOD_MS.contains(&tick), "tick period {tick} out of range");
            assert!(POLL_PERIOD_MS.contains(&poll), "poll period {poll} out of range");
        }
    }

    #[test]
    fn test_port_addresses_derived_from_base() {
        let bridge = make_bridge(1, 3, 4);
        let expected: Vec<MacAddr> = (0..4)
            .map(|i| base_addr(3).offset(1 + i).unwrap())
            .collect();
        assert_eq!(bridge.port_addresses(), expected);
    }

    #[test]
    fn test_address_space_exhaustion_is_fatal() {
        let config = BridgeConfig::new(MacAddr::new([0xFF; 6]), 4, 0);
        let factory = StubEngine::factory();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let err = Bridge::new(BridgeId(1), &config, &factory, &mut rng).unwrap_err();
        assert!(matches!(err, CreationError::AddressSpaceExhausted(_)));
    }

    #[test]
    fn test_engine_factory_failure_is_fatal() {
        let config = BridgeConfig::new(base_addr(1), 4, 0);
        let factory: EngineFactory = Box::new(|_| {
            Err(CreationError::Engine { reason: "out of instances".to_string() })
        });
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let err = Bridge::new(BridgeId(1), &config, &factory, &mut rng).unwrap_err();
        assert!(matches!(err, CreationError::Engine { .. }));
    }

    #[test]
    fn test_flood_skips_ingress_and_unwired_ports() {
        let a = &mut make_bridge(1, 1, 4);
        let b = make_bridge(2, 2, 4);
        let mut topology = Topology::new();
        topology
            .add_wire(Wire::between(
                PortRef::new(a.id(), PortIndex(0)),
                PortRef::new(b.id(), PortIndex(0)),
            ))
            .unwrap();
        let mut directory = AddressDirectory::new();
        register(&mut directory, a);
        register(&mut directory, &b);

        // Arrives on port 3; only port 0 is wired.
        a.enqueue(PortIndex(3), protocol_frame(base_addr(9)));
        let out = a.process_one_pending(&topology, &directory);

        assert_eq!(out.deliveries.len(), 1);
        let delivery = &out.deliveries[0];
        assert_eq!(delivery.dest, PortRef::new(b.id(), PortIndex(0)));
        assert_eq!(delivery.frame.path(), &[a.port(PortIndex(0)).unwrap().address()]);
        assert_eq!(a.stats().frames_relayed, 1);
    }

    #[test]
    fn test_flood_does_not_echo_out_ingress_port() {
        let a = &mut make_bridge(1, 1, 2);
        let b = make_bridge(2, 2, 2);
        let mut topology = Topology::new();
        topology
            .add_wire(Wire::between(
                PortRef::new(a.id(), PortIndex(0)),
                PortRef::new(b.id(), PortIndex(0)),
            ))
            .unwrap();
        let mut directory = AddressDirectory::new();
        register(&mut directory, a);
        register(&mut directory, &b);

        // Frame arrives on the wired port itself: the only other port is
        // unwired, so nothing goes anywhere.
        a.enqueue(PortIndex(0), protocol_frame(base_addr(9)));
        let out = a.process_one_pending(&topology, &directory);
        assert!(out.deliveries.is_empty());
    }

    #[test]
    fn test_loop_guard_skips_visited_bridges() {
        let a = &mut make_bridge(1, 1, 2);
        let b = make_bridge(2, 2, 2);
        let mut topology = Topology::new();
        topology
            .add_wire(Wire::between(
                PortRef::new(a.id(), PortIndex(1)),
                PortRef::new(b.id(), PortIndex(0)),
            ))
            .unwrap();
        let mut directory = AddressDirectory::new();
        register(&mut directory, a);
        register(&mut directory, &b);

        // The frame already went through one of B's ports.
        let mut frame = protocol_frame(base_addr(9));
        frame.record_hop(b.port(PortIndex(1)).unwrap().address());

        a.enqueue(PortIndex(0), frame);
        let out = a.process_one_pending(&topology, &directory);

        assert!(out.deliveries.is_empty());
        assert_eq!(a.stats().loops_suppressed, 1);
        assert!(out
            .app_events
            .iter()
            .any(|event| matches!(event, AppEvent::LoopSuppressed { .. })));
    }

    #[test]
    fn test_non_protocol_frame_dropped() {
        let a = &mut make_bridge(1, 1, 2);
        let topology = Topology::new();
        let directory = AddressDirectory::new();

        let mut bytes = protocol_frame_bytes(base_addr(9), 8);
        bytes[0..6].copy_from_slice(&[0xFF; 6]); // broadcast, not ours to interpret
        let frame = Frame::from_bytes(bytes, Timestamp::new(1)).unwrap();

        a.enqueue(PortIndex(0), frame);
        let out = a.process_one_pending(&topology, &directory);

        assert!(out.deliveries.is_empty());
        assert_eq!(a.stats().frames_dropped, 1);
    }

    #[test]
    fn test_bpdu_self_heals_stale_port_then_reaches_engine() {
        let a = &mut make_bridge(1, 1, 2);
        let topology = Topology::new();
        let directory = AddressDirectory::new();

        let out = a.start_engine(Timestamp::new(0), &topology);
        assert!(out.deliveries.is_empty());
        assert!(a.started());
        assert!(!a.port(PortIndex(0)).unwrap().mac_operational());

        a.enqueue(PortIndex(0), protocol_frame(base_addr(9)));
        let out = a.process_one_pending(&topology, &directory);

        // The port flipped up before the BPDU was handed over.
        assert!(a.port(PortIndex(0)).unwrap().mac_operational());
        assert_eq!(a.stats().bpdus_delivered, 1);
        assert!(out
            .app_events
            .iter()
            .any(|event| matches!(event, AppEvent::EngineLog { .. })));
    }

    #[test]
    fn test_tick_is_noop_while_stopped() {
        let a = &mut make_bridge(1, 1, 2);
        let topology = Topology::new();
        let out = a.on_tick(Timestamp::new(1000), &topology);
        assert!(out.deliveries.is_empty());
        assert!(out.app_events.is_empty());
        assert_eq!(a.stats().ticks, 0);
    }

    #[test]
    fn test_started_tick_transmits_on_connected_up_ports() {
        let a = &mut make_bridge(1, 1, 2);
        let b = make_bridge(2, 2, 2);
        let mut topology = Topology::new();
        topology
            .add_wire(Wire::between(
                PortRef::new(a.id(), PortIndex(0)),
                PortRef::new(b.id(), PortIndex(1)),
            ))
            .unwrap();

        a.start_engine(Timestamp::new(0), &topology);
        let out = a.on_link_poll(Timestamp::new(50), &topology);
        assert!(out.app_events.iter().any(|e| matches!(e, AppEvent::Invalidated { .. })));
        assert!(a.port(PortIndex(0)).unwrap().mac_operational());
        assert!(a.port(PortIndex(0)).unwrap().forwarding());

        let out = a.on_tick(Timestamp::new(1000), &topology);
        assert_eq!(out.deliveries.len(), 1);
        let delivery = &out.deliveries[0];
        assert_eq!(delivery.dest, PortRef::new(b.id(), PortIndex(1)));
        assert!(delivery.frame.is_protocol());
        assert_eq!(delivery.frame.src_mac(), a.port(PortIndex(0)).unwrap().address());
        assert_eq!(delivery.frame.path(), &[a.port(PortIndex(0)).unwrap().address()]);
        assert_eq!(delivery.frame.bpdu_payload().unwrap().len(), crate::engine::STUB_BPDU_LEN);
        assert_eq!(
            delivery.frame.as_bytes().len(),
            BPDU_PAYLOAD_OFFSET + crate::engine::STUB_BPDU_LEN
        );
    }

    #[test]
    fn test_link_poll_reports_disconnection() {
        let a = &mut make_bridge(1, 1, 2);
        let b = make_bridge(2, 2, 2);
        let mut topology = Topology::new();
        let wire = topology
            .add_wire(Wire::between(
                PortRef::new(a.id(), PortIndex(0)),
                PortRef::new(b.id(), PortIndex(0)),
            ))
            .unwrap();

        a.start_engine(Timestamp::new(0), &topology);
        a.on_link_poll(Timestamp::new(50), &topology);
        assert!(a.port(PortIndex(0)).unwrap().mac_operational());

        topology.remove_wire(wire).unwrap();
        let out = a.on_link_poll(Timestamp::new(100), &topology);
        assert!(!a.port(PortIndex(0)).unwrap().mac_operational());
        assert!(out
            .app_events
            .iter()
            .any(|event| matches!(event, AppEvent::Invalidated { .. })));
    }

    #[test]
    fn test_set_address_rederives_ports() {
        let a = &mut make_bridge(1, 1, 3);
        a.set_address(base_addr(7)).unwrap();
        assert_eq!(a.address(), base_addr(7));
        assert_eq!(
            a.port_addresses(),
            (0..3).map(|i| base_addr(7).offset(1 + i).unwrap()).collect::<Vec<_>>()
        );

        // Overflow leaves everything untouched.
        let before = a.port_addresses();
        assert!(a.set_address(MacAddr::new([0xFF; 6])).is_err());
        assert_eq!(a.port_addresses(), before);
        assert_eq!(a.address(), base_addr(7));
    }
}
