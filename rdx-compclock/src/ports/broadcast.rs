//! The default broadcast port: a tokio broadcast channel.

use super::Broadcast;
use crate::events::CompetitionEvent;
use tokio::sync::broadcast;
use tracing::trace;

/// Fans every event out to all current subscribers.
///
/// Sending with no subscribers is not an error; a surface that connects later
/// bootstraps from the engine snapshot instead of a replay.
#[derive(Clone)]
pub struct BroadcastHub {
    sender: broadcast::Sender<CompetitionEvent>,
}

impl BroadcastHub {
    /// Creates a hub whose subscribers may lag by up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribes to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<CompetitionEvent> {
        self.sender.subscribe()
    }

    /// Number of surfaces currently listening.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Broadcast for BroadcastHub {
    fn emit(&self, event: CompetitionEvent) {
        trace!("emit {}", event.name());
        self.sender.send(event).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events_in_emit_order() {
        let hub = BroadcastHub::new(8);
        let mut rx = hub.subscribe();
        hub.emit(CompetitionEvent::RoundTurnoverBegin);
        hub.emit(CompetitionEvent::StopCue);
        assert_eq!(rx.recv().await.unwrap(), CompetitionEvent::RoundTurnoverBegin);
        assert_eq!(rx.recv().await.unwrap(), CompetitionEvent::StopCue);
    }

    #[test]
    fn emit_without_subscribers_is_harmless() {
        let hub = BroadcastHub::default();
        assert_eq!(hub.subscriber_count(), 0);
        hub.emit(CompetitionEvent::RoundStageEnd);
    }
}
