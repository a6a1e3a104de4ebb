//! The simulation task
//!
//! One task owns the whole project and drains the dispatcher, one message at
//! a time. Commands and events mutate state synchronously; their outward
//! effects (frames for other bridges, app events for the rendering layer)
//! are applied in order before the next message is drained. Errors applying
//! a command are reported and the loop keeps running; only shutdown or the
//! command side hanging up ends it.

use rand::rngs::StdRng;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use spansim_core::bridge::{Delivery, Outputs};
use spansim_core::channel::AppEventSender;
use spansim_core::engine::EngineFactory;
use spansim_core::config::BridgeConfig;
use spansim_core::events::{AppEvent, Command, Event, SimStats};
use spansim_core::frame::Frame;
use spansim_core::types::{BridgeId, PortRef};

use crate::dispatcher::{Dispatched, Dispatcher, DispatcherHandle};
use crate::project::{Project, ProjectError};
use crate::timer::SimClock;

// ----------------------------------------------------------------------------
// Simulation
// ----------------------------------------------------------------------------

/// The simulation: project state plus the dispatcher that feeds it.
pub struct Simulation {
    project: Project,
    dispatcher: Dispatcher,
    handle: DispatcherHandle,
    app_events: AppEventSender,
    clock: SimClock,
    rng: StdRng,
    engine_factory: EngineFactory,
    stats: SimStats,
}

impl Simulation {
    pub(crate) fn new(
        dispatcher: Dispatcher,
        handle: DispatcherHandle,
        app_events: AppEventSender,
        rng: StdRng,
        engine_factory: EngineFactory,
    ) -> Self {
        Self {
            project: Project::new(),
            dispatcher,
            handle,
            app_events,
            clock: SimClock::new(),
            rng,
            engine_factory,
            stats: SimStats::default(),
        }
    }

    /// Builder with the default (stub) engine factory.
    pub fn builder() -> crate::builder::SimulationBuilder {
        crate::builder::SimulationBuilder::new()
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn stats(&self) -> SimStats {
        self.stats
    }

    /// A posting handle for external event sources.
    pub fn handle(&self) -> DispatcherHandle {
        self.handle.clone()
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    // ------------------------------------------------------------------
    // Run loop
    // ------------------------------------------------------------------

    /// Drain until shutdown. Consumes the simulation; on exit every bridge
    /// timer has been cancelled.
    pub async fn run(mut self) {
        info!("simulation running");
        loop {
            match self.dispatcher.next().await {
                Dispatched::Closed => {
                    debug!("command channel closed, shutting down");
                    break;
                }
                Dispatched::Command(command) => {
                    if !self.process_command(command) {
                        break;
                    }
                }
                Dispatched::Event(event) => self.process_event(event),
            }
        }
        self.project.cancel_all_timers();
        info!("simulation stopped");
    }

    /// Process queued events to exhaustion without waiting. Processing may
    /// queue more (relay chains); those drain too.
    pub fn drain_pending_events(&mut self) {
        while self.step_event() {}
    }

    /// Process exactly one queued event, if there is one.
    pub fn step_event(&mut self) -> bool {
        match self.dispatcher.try_next_event() {
            Some(event) => {
                self.process_event(event);
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Apply one command. Returns false when the simulation should stop.
    pub fn process_command(&mut self, command: Command) -> bool {
        self.stats.commands_processed += 1;
        match command {
            Command::AddBridge { config, x, y } => {
                let created = self.project.add_bridge(
                    &config,
                    x,
                    y,
                    &self.engine_factory,
                    &mut self.rng,
                    &self.handle,
                    &self.clock,
                );
                match created {
                    Ok(id) => self.emit(AppEvent::BridgeAdded { bridge: id }),
                    Err(err) => self.report_error("add bridge", err),
                }
            }
            Command::RemoveBridge { bridge } => match self.project.remove_bridge(bridge) {
                Ok(()) => self.emit(AppEvent::BridgeRemoved { bridge }),
                Err(err) => self.report_error("remove bridge", err),
            },
            Command::AddWire { end0, end1 } => match self.project.add_wire(end0, end1) {
                Ok(wire) => self.emit(AppEvent::WireAdded { wire }),
                Err(err) => self.report_error("add wire", err),
            },
            Command::RemoveWire { wire } => match self.project.remove_wire(wire) {
                Ok(()) => self.emit(AppEvent::WireRemoved { wire }),
                Err(err) => self.report_error("remove wire", err),
            },
            Command::SetWireEnd { wire, end, to } => {
                if let Err(err) = self.project.set_wire_end(wire, end, to) {
                    self.report_error("set wire end", err);
                }
            }
            Command::Move { bridge, x, y } => {
                if let Err(err) = self.project.move_bridge(bridge, x, y) {
                    self.report_error("move bridge", err);
                }
            }
            Command::SetAddress { bridge, address } => {
                match self.project.set_address(bridge, address) {
                    Ok(()) => self.emit(AppEvent::Invalidated { bridge }),
                    Err(err) => self.report_error("set address", err),
                }
            }
            Command::StartEngine { bridge } => {
                let now = self.clock.now();
                match self.project.start_engine(bridge, now) {
                    Some(outputs) => self.apply(outputs),
                    None => self.report_error("start engine", ProjectError::UnknownBridge(bridge)),
                }
            }
            Command::StopEngine { bridge } => {
                let now = self.clock.now();
                match self.project.stop_engine(bridge, now) {
                    Some(outputs) => self.apply(outputs),
                    None => self.report_error("stop engine", ProjectError::UnknownBridge(bridge)),
                }
            }
            Command::SetPortCount { bridge, port_count } => {
                match self.project.bridge(bridge).map(|b| b.config()) {
                    Some(mut config) => {
                        config.port_count = port_count;
                        self.rebuild(bridge, config);
                    }
                    None => self.report_error("set port count", ProjectError::UnknownBridge(bridge)),
                }
            }
            Command::SetMstiCount { bridge, msti_count } => {
                match self.project.bridge(bridge).map(|b| b.config()) {
                    Some(mut config) => {
                        config.msti_count = msti_count;
                        self.rebuild(bridge, config);
                    }
                    None => self.report_error("set msti count", ProjectError::UnknownBridge(bridge)),
                }
            }
            Command::InjectFrame { bridge, port, bytes } => {
                match Frame::from_bytes(bytes, self.clock.now()) {
                    Ok(frame) => {
                        let delivery = Delivery { dest: PortRef::new(bridge, port), frame };
                        if self.project.enqueue_frame(delivery) {
                            self.post_packet_available(bridge);
                        } else {
                            self.report_error("inject frame", ProjectError::UnknownBridge(bridge));
                        }
                    }
                    Err(err) => self.report_error("inject frame", err),
                }
            }
            Command::GetState => {
                let report = self.project.snapshot(self.stats);
                self.emit(AppEvent::StateReport(report));
            }
            Command::Shutdown => {
                debug!("shutdown requested");
                return false;
            }
        }
        true
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Apply one dispatched event.
    pub fn process_event(&mut self, event: Event) {
        self.stats.events_processed += 1;
        let bridge = event.bridge();
        let outputs = match event {
            Event::Tick { bridge, timestamp } => self.project.tick(bridge, timestamp),
            Event::LinkPoll { bridge, timestamp } => self.project.link_poll(bridge, timestamp),
            Event::PacketAvailable { bridge } => self.project.process_packet(bridge),
        };
        match outputs {
            Some(outputs) => self.apply(outputs),
            None => {
                // The bridge went away after this was posted; expected
                // during teardown, never an error.
                self.stats.stale_events += 1;
                debug!(bridge = bridge.0, "dropping event for removed bridge");
            }
        }
    }

    // ------------------------------------------------------------------
    // Effects
    // ------------------------------------------------------------------

    fn apply(&mut self, outputs: Outputs) {
        for delivery in outputs.deliveries {
            let bridge = delivery.dest.bridge;
            if self.project.enqueue_frame(delivery) {
                self.post_packet_available(bridge);
            } else {
                self.stats.stale_events += 1;
            }
        }
        for event in outputs.app_events {
            self.emit(event);
        }
    }

    fn post_packet_available(&self, bridge: BridgeId) {
        if self.handle.post(Event::PacketAvailable { bridge }).is_err() {
            debug!("dispatcher closed while posting packet event");
        }
    }

    /// Non-blocking app event emission: a slow renderer drops, it never
    /// stalls the simulation.
    fn emit(&mut self, event: AppEvent) {
        match self.app_events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                self.stats.app_events_dropped += 1;
                debug!(?event, "rendering layer not keeping up; dropping app event");
            }
            Err(TrySendError::Closed(_)) => {
                // Nobody rendering; state changes still land in the log.
            }
        }
    }

    fn rebuild(&mut self, bridge: BridgeId, config: BridgeConfig) {
        let rebuilt = self.project.rebuild_bridge(
            bridge,
            &config,
            &self.engine_factory,
            &mut self.rng,
            &self.handle,
            &self.clock,
        );
        match rebuilt {
            Ok(()) => self.emit(AppEvent::Invalidated { bridge }),
            Err(err) => self.report_error("rebuild bridge", err),
        }
    }

    fn report_error(&mut self, context: &str, err: impl std::fmt::Display) {
        warn!("{context}: {err}");
        self.emit(AppEvent::Error { message: format!("{context}: {err}") });
    }
}
