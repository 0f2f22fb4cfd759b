//! Server-Sent Events (SSE) stream of engine events.

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use convoflow_app::ports::EnginePorts;

use crate::state::AppState;

/// `GET /api/events/stream`: SSE stream of engine events.
///
/// Each event is a JSON-encoded SSE `data:` frame whose `event:` name is the
/// event type (`automation_completed`, `job_failed`, …). The stream
/// continues until the client disconnects or the event bus is closed.
pub async fn stream<P: EnginePorts>(
    State(state): State<AppState<P>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, std::convert::Infallible>>> {
    let event_rx = state.event_bus.subscribe();
    let event_stream = BroadcastStream::new(event_rx).filter_map(|result| match result {
        Ok(event) => match serde_json::to_string(&event) {
            Ok(json) => Some(Ok(Event::default()
                .event(event.event_type.as_str())
                .data(json))),
            Err(err) => {
                tracing::warn!(%err, "failed to serialize event to JSON for SSE stream");
                None
            }
        },
        Err(BroadcastStreamRecvError::Lagged(n)) => {
            tracing::warn!(
                skipped = n,
                "SSE subscriber lagged, some events were dropped"
            );
            None
        }
    });

    Sse::new(event_stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use convoflow_app::ports::EventPublisher;
    use convoflow_domain::event::{Event as DomainEvent, EventType};
    use convoflow_domain::id::ContactId;

    use crate::test_support::TestApp;

    #[tokio::test]
    async fn should_relay_published_event_when_client_is_subscribed() {
        let app = TestApp::with(Vec::new()).await;

        let response = app
            .router()
            .oneshot(
                Request::builder()
                    .uri("/api/events/stream")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );

        app.event_bus
            .publish(DomainEvent::new(
                EventType::HumanHandoffRequested,
                Some(ContactId::new()),
                serde_json::json!({"reason": "pediu atendente"}),
            ))
            .await
            .unwrap();

        let mut body = response.into_body();
        let frame = body.frame().await.unwrap().unwrap();
        let text = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();
        assert!(text.contains("event: human_handoff_requested"));
        assert!(text.contains("pediu atendente"));
    }
}
