//! Per-bridge periodic timers
//!
//! Each bridge owns two timers: the one-second protocol tick and the fast
//! link poll, both with per-bridge randomized periods drawn at bridge
//! construction. The timer tasks never touch simulation state; their whole
//! job is to post an event carrying the current simulation time.
//!
//! Cancellation is explicit and happens before the owning bridge is torn
//! down, so a cancelled timer can never post an event for a bridge that no
//! longer exists.

use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tracing::debug;

use spansim_core::bridge::Bridge;
use spansim_core::errors::CreationError;
use spansim_core::events::Event;
use spansim_core::types::{BridgeId, Timestamp};

use crate::dispatcher::DispatcherHandle;

// ----------------------------------------------------------------------------
// Simulation Clock
// ----------------------------------------------------------------------------

/// Milliseconds since the simulation started.
///
/// Built on the tokio clock so that paused-time tests control it.
#[derive(Debug, Clone)]
pub struct SimClock {
    origin: Instant,
}

impl SimClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }

    pub fn now(&self) -> Timestamp {
        Timestamp::new(self.origin.elapsed().as_millis() as u32)
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Bridge Timers
// ----------------------------------------------------------------------------

/// The two running timer tasks of one bridge.
#[derive(Debug)]
pub struct BridgeTimers {
    bridge: BridgeId,
    tick: JoinHandle<()>,
    poll: JoinHandle<()>,
}

impl BridgeTimers {
    /// Start both timers for `bridge`, posting through `handle`.
    ///
    /// Fails when no timer service is available (no tokio runtime on this
    /// thread), which bridge construction treats as fatal.
    pub fn start(
        bridge: &Bridge,
        handle: &DispatcherHandle,
        clock: &SimClock,
    ) -> Result<Self, CreationError> {
        tokio::runtime::Handle::try_current()
            .map_err(|err| CreationError::Timer { reason: err.to_string() })?;

        let id = bridge.id();
        let tick = spawn_periodic(bridge.tick_period(), handle.clone(), clock.clone(), move |timestamp| {
            Event::Tick { bridge: id, timestamp }
        });
        let poll = spawn_periodic(bridge.poll_period(), handle.clone(), clock.clone(), move |timestamp| {
            Event::LinkPoll { bridge: id, timestamp }
        });

        Ok(Self { bridge: id, tick, poll })
    }

    /// Cancel both timer tasks. After this returns, neither can post again.
    pub fn cancel(&self) {
        debug!(bridge = self.bridge.0, "cancelling bridge timers");
        self.tick.abort();
        self.poll.abort();
    }
}

impl Drop for BridgeTimers {
    fn drop(&mut self) {
        self.tick.abort();
        self.poll.abort();
    }
}

/// Spawn one periodic posting task. The first firing is one full period
/// after start, so freshly-created bridges don't all speak at once.
fn spawn_periodic(
    period: Duration,
    handle: DispatcherHandle,
    clock: SimClock,
    make_event: impl Fn(Timestamp) -> Event + Send + 'static,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if handle.post(make_event(clock.now())).is_err() {
                // Dispatcher is gone; nothing left to time.
                break;
            }
        }
    })
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Dispatcher;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use spansim_core::config::{BridgeConfig, ChannelConfig, POLL_PERIOD_MS, TICK_PERIOD_MS};
    use spansim_core::engine::StubEngine;
    use spansim_core::types::MacAddr;

    fn make_bridge(seed: u64) -> Bridge {
        let config = BridgeConfig::new(MacAddr::new([0x02, 0, 0, 0, 0, 0x10]), 2, 0);
        let factory = StubEngine::factory();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Bridge::new(BridgeId(1), &config, &factory, &mut rng).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_fires_before_tick() {
        let (_commands, handle, mut dispatcher) = Dispatcher::new(&ChannelConfig::default());
        let clock = SimClock::new();
        let bridge = make_bridge(3);
        let timers = BridgeTimers::start(&bridge, &handle, &clock).unwrap();

        // Advance past the longest possible poll period but short of any
        // possible tick period.
        tokio::time::advance(Duration::from_millis(*POLL_PERIOD_MS.end() + 1)).await;

        let mut polls = 0;
        while let Some(event) = dispatcher.try_next_event() {
            match event {
                Event::LinkPoll { bridge, .. } => {
                    assert_eq!(bridge, BridgeId(1));
                    polls += 1;
                }
                other => panic!("unexpected event before first tick: {other:?}"),
            }
        }
        assert!(polls >= 1);

        tokio::time::advance(Duration::from_millis(*TICK_PERIOD_MS.end() + 1)).await;
        let mut saw_tick = false;
        while let Some(event) = dispatcher.try_next_event() {
            if matches!(event, Event::Tick { .. }) {
                saw_tick = true;
            }
        }
        assert!(saw_tick);

        timers.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timers_post_nothing() {
        let (_commands, handle, mut dispatcher) = Dispatcher::new(&ChannelConfig::default());
        let clock = SimClock::new();
        let bridge = make_bridge(4);
        let timers = BridgeTimers::start(&bridge, &handle, &clock).unwrap();

        timers.cancel();
        tokio::time::advance(Duration::from_millis(5_000)).await;
        assert!(dispatcher.try_next_event().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_carry_advancing_timestamps() {
        let (_commands, handle, mut dispatcher) = Dispatcher::new(&ChannelConfig::default());
        let clock = SimClock::new();
        let bridge = make_bridge(5);
        let _timers = BridgeTimers::start(&bridge, &handle, &clock).unwrap();

        tokio::time::advance(Duration::from_millis(200)).await;

        let mut last = Timestamp::new(0);
        let mut count = 0;
        while let Some(Event::LinkPoll { timestamp, .. }) = dispatcher.try_next_event() {
            assert!(timestamp >= last);
            last = timestamp;
            count += 1;
        }
        assert!(count >= 2);
    }

    #[test]
    fn test_no_runtime_means_no_timers() {
        // Outside a tokio runtime the timer service is unavailable and
        // construction must fail cleanly.
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (handle, clock, bridge) = runtime.block_on(async {
            let (_commands, handle, _dispatcher) = Dispatcher::new(&ChannelConfig::default());
            (handle, SimClock::new(), make_bridge(6))
        });
        drop(runtime);

        let err = BridgeTimers::start(&bridge, &handle, &clock).unwrap_err();
        assert!(matches!(err, CreationError::Timer { .. }));
    }
}
