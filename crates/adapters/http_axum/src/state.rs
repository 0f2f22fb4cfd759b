//! Shared application state for axum handlers.

use std::sync::Arc;

use convoflow_app::engine::AutomationEngine;
use convoflow_app::event_bus::InProcessEventBus;
use convoflow_app::ports::EnginePorts;

/// Application state shared across all axum handlers.
///
/// `Clone` is implemented manually so `P` itself does not need to be
/// `Clone`; only the `Arc` wrappers are cloned.
pub struct AppState<P: EnginePorts> {
    pub engine: Arc<AutomationEngine<P>>,
    /// Source of the `/api/events/stream` feed.
    pub event_bus: Arc<InProcessEventBus>,
}

impl<P: EnginePorts> Clone for AppState<P> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            event_bus: Arc::clone(&self.event_bus),
        }
    }
}

impl<P: EnginePorts> AppState<P> {
    pub fn new(engine: Arc<AutomationEngine<P>>, event_bus: Arc<InProcessEventBus>) -> Self {
        Self { engine, event_bus }
    }
}
