//! Event bus port: publish/subscribe for engine events.

use std::future::Future;

use convoflow_domain::error::ConvoFlowError;
use convoflow_domain::event::Event;

/// Publishes engine events to interested subscribers.
pub trait EventPublisher {
    /// Publish an event to all current subscribers.
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), ConvoFlowError>> + Send;
}

impl<T: EventPublisher + Send + Sync> EventPublisher for std::sync::Arc<T> {
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), ConvoFlowError>> + Send {
        (**self).publish(event)
    }
}
