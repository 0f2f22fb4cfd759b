//! JSON REST API handler modules.

#[allow(clippy::missing_errors_doc)]
pub mod automations;
#[allow(clippy::missing_errors_doc)]
pub mod events;
pub mod queue;
pub mod sse;
#[allow(clippy::missing_errors_doc)]
pub mod webhooks;

use axum::Router;
use axum::routing::{get, post};

use convoflow_app::ports::EnginePorts;

use crate::state::AppState;

/// Build the `/api` sub-router.
pub fn routes<P: EnginePorts>() -> Router<AppState<P>> {
    Router::new()
        // Inbound channel events
        .route("/events/messages", post(events::message::<P>))
        .route("/events/buttons", post(events::button_click::<P>))
        .route("/events/stream", get(sse::stream::<P>))
        // Webhook triggers
        .route("/webhooks/{automation_id}", post(webhooks::trigger::<P>))
        // Automations
        .route("/automations/quarantined", get(automations::quarantined::<P>))
        .route("/automations/{id}/execute", post(automations::execute::<P>))
        // Queue
        .route("/queue/stats", get(queue::stats::<P>))
}
