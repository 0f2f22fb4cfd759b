//! Queue statistics.

use axum::Json;
use axum::extract::State;

use convoflow_app::ports::EnginePorts;
use convoflow_app::queue::QueueStats;

use crate::state::AppState;

/// `GET /api/queue/stats`: per job type pending and delayed counts.
pub async fn stats<P: EnginePorts>(State(state): State<AppState<P>>) -> Json<QueueStats> {
    Json(state.engine.queue().stats())
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use convoflow_domain::automation::{ActionKind, Automation, AutomationAction, Trigger};
    use convoflow_domain::id::OwnerId;

    use crate::test_support::{TestApp, get_json, post_json};

    #[tokio::test]
    async fn should_report_every_job_type_when_queue_is_idle() {
        let app = TestApp::with(Vec::new()).await;

        let (status, body) = get_json(app.router(), "/api/queue/stats").await;

        assert_eq!(status, StatusCode::OK);
        for job_type in ["send_message", "automation_action"] {
            assert_eq!(body["types"][job_type]["pending"], json!(0));
        }
    }

    #[tokio::test]
    async fn should_count_pending_message_when_walk_sends_text() {
        let owner = OwnerId::new();
        let welcome = Automation::builder()
            .owner(owner)
            .name("Welcome")
            .trigger(Trigger::Keyword {
                keywords: vec!["oi".to_string()],
            })
            .action(AutomationAction::new("1", ActionKind::text("Olá!")))
            .build()
            .unwrap();
        let app = TestApp::with(vec![welcome]).await;
        post_json(
            app.router(),
            "/api/events/messages",
            json!({
                "owner_id": owner,
                "identifier": "5511999999999",
                "channel": "whatsapp",
                "text": "oi"
            }),
        )
        .await;

        let (_, body) = get_json(app.router(), "/api/queue/stats").await;

        assert_eq!(body["types"]["send_message"]["pending"], json!(1));
    }
}
