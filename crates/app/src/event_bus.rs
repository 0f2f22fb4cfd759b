//! In-process event bus backed by a tokio broadcast channel.

use std::future::Future;

use tokio::sync::broadcast;

use convoflow_domain::error::ConvoFlowError;
use convoflow_domain::event::Event;

use crate::ports::EventPublisher;

/// In-process event bus using a tokio [`broadcast`] channel.
///
/// Publishing succeeds even when there are no active subscribers
/// (the event is simply dropped).
pub struct InProcessEventBus {
    sender: broadcast::Sender<Event>,
}

impl InProcessEventBus {
    /// Create a new event bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl EventPublisher for InProcessEventBus {
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), ConvoFlowError>> + Send {
        // Only fails without receivers.
        let _ = self.sender.send(event);
        async { Ok(()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoflow_domain::event::EventType;
    use convoflow_domain::id::ContactId;

    #[tokio::test]
    async fn should_deliver_event_to_every_subscriber() {
        let bus = InProcessEventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let event = Event::new(
            EventType::HumanHandoffRequested,
            Some(ContactId::new()),
            serde_json::json!({"automation_id": "a"}),
        );
        let event_id = event.id;
        bus.publish(event).await.unwrap();

        assert_eq!(rx1.recv().await.unwrap().id, event_id);
        assert_eq!(rx2.recv().await.unwrap().id, event_id);
    }

    #[tokio::test]
    async fn should_succeed_when_no_subscribers() {
        let bus = InProcessEventBus::new(16);
        let event = Event::new(EventType::JobCompleted, None, serde_json::json!({}));
        assert!(bus.publish(event).await.is_ok());
    }

    #[tokio::test]
    async fn should_not_replay_events_published_before_subscription() {
        let bus = InProcessEventBus::new(16);
        bus.publish(Event::new(EventType::JobFailed, None, serde_json::json!({})))
            .await
            .unwrap();

        let mut rx = bus.subscribe();
        let later = Event::new(EventType::JobCompleted, None, serde_json::json!({}));
        let later_id = later.id;
        bus.publish(later).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().id, later_id);
    }
}
