//! Channel plumbing for the dispatcher protocol
//!
//! Commands and app events ride bounded channels sized by [`ChannelConfig`].
//! The event channel is unbounded: the simulation posts packet-available
//! events to itself while it is the only drainer, and a bounded channel
//! there would deadlock once full. Posting therefore never blocks, which is
//! exactly what hardware-timer callers need.

use tokio::sync::mpsc;

use crate::config::ChannelConfig;
use crate::errors::DispatchError;
use crate::events::{AppEvent, Command, Event};

// ----------------------------------------------------------------------------
// Channel Type Aliases
// ----------------------------------------------------------------------------

pub type CommandSender = mpsc::Sender<Command>;
pub type CommandReceiver = mpsc::Receiver<Command>;
pub type EventSender = mpsc::UnboundedSender<Event>;
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;
pub type AppEventSender = mpsc::Sender<AppEvent>;
pub type AppEventReceiver = mpsc::Receiver<AppEvent>;

// ----------------------------------------------------------------------------
// Channel Creation
// ----------------------------------------------------------------------------

/// Create the bounded command channel (editing layer -> simulation).
pub fn create_command_channel(config: &ChannelConfig) -> (CommandSender, CommandReceiver) {
    mpsc::channel(config.command_buffer_size)
}

/// Create the unbounded event channel (timers/transmissions -> simulation).
pub fn create_event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Create the bounded app event channel (simulation -> rendering layer).
pub fn create_app_event_channel(config: &ChannelConfig) -> (AppEventSender, AppEventReceiver) {
    mpsc::channel(config.app_event_buffer_size)
}

// ----------------------------------------------------------------------------
// Posting
// ----------------------------------------------------------------------------

/// Post an event, mapping channel closure to [`DispatchError`].
pub fn post_event(sender: &EventSender, event: Event) -> Result<(), DispatchError> {
    sender.send(event).map_err(|_| DispatchError::Closed)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BridgeId;

    #[tokio::test]
    async fn test_event_channel_round_trip() {
        let (sender, mut receiver) = create_event_channel();
        post_event(&sender, Event::PacketAvailable { bridge: BridgeId(1) }).unwrap();

        let received = receiver.recv().await.unwrap();
        assert!(matches!(received, Event::PacketAvailable { bridge: BridgeId(1) }));
    }

    #[tokio::test]
    async fn test_post_after_close_is_an_error() {
        let (sender, receiver) = create_event_channel();
        drop(receiver);
        let err = post_event(&sender, Event::PacketAvailable { bridge: BridgeId(1) });
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_command_channel_round_trip() {
        let config = ChannelConfig::default();
        let (sender, mut receiver) = create_command_channel(&config);
        sender.send(Command::GetState).await.unwrap();

        let received = receiver.recv().await.unwrap();
        assert!(matches!(received, Command::GetState));
    }
}
