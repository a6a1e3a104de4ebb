//! The dispatcher: one logical thread of control
//!
//! Everything that happens in the simulation (timer ticks, link polls,
//! packet arrivals, editing commands) is serialized through this object.
//! Background tasks are only ever given a [`DispatcherHandle`]; they post,
//! the simulation task drains, one message at a time, FIFO per source.
//!
//! There is no hidden global here: the dispatcher is an explicit object
//! whose lifetime is the set of live handles. Once every handle is dropped
//! and the command side is gone, the drain loop observes closure and ends.

use spansim_core::channel::{
    create_command_channel, create_event_channel, CommandReceiver, CommandSender, EventReceiver,
    EventSender,
};
use spansim_core::config::ChannelConfig;
use spansim_core::errors::DispatchError;
use spansim_core::events::{Command, Event};

// ----------------------------------------------------------------------------
// Dispatcher Handle
// ----------------------------------------------------------------------------

/// Posting side of the dispatcher.
///
/// Cheap to clone; safe to use from timer tasks or any other thread. Posting
/// never blocks (the event channel is unbounded) and fails only once the
/// dispatcher itself is gone.
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    events: EventSender,
}

impl DispatcherHandle {
    /// Post an event for the simulation task to drain.
    pub fn post(&self, event: Event) -> Result<(), DispatchError> {
        spansim_core::channel::post_event(&self.events, event)
    }
}

// ----------------------------------------------------------------------------
// Dispatcher
// ----------------------------------------------------------------------------

/// One drained message.
#[derive(Debug)]
pub enum Dispatched {
    Command(Command),
    Event(Event),
    /// The command side hung up; time to wind down.
    Closed,
}

/// Draining side of the dispatcher; owned by the simulation task.
#[derive(Debug)]
pub struct Dispatcher {
    commands: CommandReceiver,
    events: EventReceiver,
}

impl Dispatcher {
    /// Create the dispatcher and its two posting sides.
    pub fn new(config: &ChannelConfig) -> (CommandSender, DispatcherHandle, Dispatcher) {
        let (command_sender, commands) = create_command_channel(config);
        let (event_sender, events) = create_event_channel();
        (
            command_sender,
            DispatcherHandle { events: event_sender },
            Dispatcher { commands, events },
        )
    }

    /// Wait for the next message.
    ///
    /// Commands and events each drain in FIFO order; between the two sources
    /// there is no ordering guarantee, matching real bridges that do not
    /// synchronize with their operators.
    pub async fn next(&mut self) -> Dispatched {
        tokio::select! {
            command = self.commands.recv() => match command {
                Some(command) => Dispatched::Command(command),
                None => Dispatched::Closed,
            },
            event = self.events.recv() => match event {
                Some(event) => Dispatched::Event(event),
                None => Dispatched::Closed,
            },
        }
    }

    /// Take one already-posted event without waiting. Used to run queued
    /// work to completion deterministically (tests, synchronous drains).
    pub fn try_next_event(&mut self) -> Option<Event> {
        self.events.try_recv().ok()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use spansim_core::types::BridgeId;

    #[tokio::test]
    async fn test_events_drain_in_post_order() {
        let (_commands, handle, mut dispatcher) = Dispatcher::new(&ChannelConfig::default());

        for id in 0..4 {
            handle.post(Event::PacketAvailable { bridge: BridgeId(id) }).unwrap();
        }

        for id in 0..4 {
            match dispatcher.next().await {
                Dispatched::Event(Event::PacketAvailable { bridge }) => {
                    assert_eq!(bridge, BridgeId(id));
                }
                other => panic!("unexpected message: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_command_side_closure_ends_the_loop() {
        let (commands, _handle, mut dispatcher) = Dispatcher::new(&ChannelConfig::default());
        drop(commands);
        assert!(matches!(dispatcher.next().await, Dispatched::Closed));
    }

    #[tokio::test]
    async fn test_try_next_event_is_non_blocking() {
        let (_commands, handle, mut dispatcher) = Dispatcher::new(&ChannelConfig::default());
        assert!(dispatcher.try_next_event().is_none());

        handle.post(Event::PacketAvailable { bridge: BridgeId(7) }).unwrap();
        assert!(dispatcher.try_next_event().is_some());
        assert!(dispatcher.try_next_event().is_none());
    }
}
