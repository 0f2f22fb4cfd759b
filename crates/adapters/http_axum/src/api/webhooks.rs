//! Per-automation webhook triggers.

use std::str::FromStr;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use convoflow_app::executor::WalkOutcome;
use convoflow_app::ports::{ContactStore, EnginePorts};
use convoflow_domain::contact::Channel;
use convoflow_domain::error::{ConvoFlowError, NotFoundError};
use convoflow_domain::id::AutomationId;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for a webhook call. `data` is handed to the walk as the
/// trigger payload.
#[derive(Deserialize)]
pub struct WebhookRequest {
    pub identifier: String,
    pub channel: Channel,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Possible responses from the webhook endpoint.
pub enum TriggerResponse {
    Ok(Json<WalkOutcome>),
}

impl IntoResponse for TriggerResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Ok(json) => json.into_response(),
        }
    }
}

/// `POST /api/webhooks/{automation_id}`
///
/// The contact is resolved under the automation's owner.
pub async fn trigger<P: EnginePorts>(
    State(state): State<AppState<P>>,
    Path(automation_id): Path<String>,
    Json(body): Json<WebhookRequest>,
) -> Result<TriggerResponse, ApiError> {
    let automation_id =
        AutomationId::from_str(&automation_id).map_err(|_| ApiError::invalid_id(&automation_id))?;
    let owner_id = state
        .engine
        .registry()
        .get(automation_id)
        .map(|a| a.owner_id())
        .ok_or_else(|| {
            ConvoFlowError::from(NotFoundError {
                entity: "Webhook automation",
                id: automation_id.to_string(),
            })
        })?;
    let contact = state
        .engine
        .ports()
        .contacts()
        .find_or_create(owner_id, &body.identifier, body.channel)
        .await?;
    let outcome = state
        .engine
        .handle_webhook(automation_id, contact, body.data)
        .await?;
    Ok(TriggerResponse::Ok(Json(outcome)))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use convoflow_domain::automation::{ActionKind, Automation, AutomationAction, Trigger};
    use convoflow_domain::id::{AutomationId, OwnerId};

    use crate::test_support::{TestApp, post_json};

    fn order_paid(owner: OwnerId) -> Automation {
        Automation::builder()
            .owner(owner)
            .name("Order paid")
            .trigger(Trigger::Webhook)
            .action(AutomationAction::new("1", ActionKind::add_tag("cliente")))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn should_run_automation_when_webhook_is_called() {
        let automation = order_paid(OwnerId::new());
        let id = automation.id;
        let app = TestApp::with(vec![automation]).await;

        let (status, body) = post_json(
            app.router(),
            &format!("/api/webhooks/{id}"),
            json!({
                "identifier": "cliente@example.com",
                "channel": "email",
                "data": {"order": 42}
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["automation_id"], json!(id));
        assert_eq!(body["executed"], json!(["1"]));
    }

    #[tokio::test]
    async fn should_return_404_when_automation_is_unknown() {
        let app = TestApp::with(Vec::new()).await;

        let (status, body) = post_json(
            app.router(),
            &format!("/api/webhooks/{}", AutomationId::new()),
            json!({"identifier": "x@example.com", "channel": "email"}),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("Webhook automation"));
    }

    #[tokio::test]
    async fn should_return_400_when_id_is_malformed() {
        let app = TestApp::with(Vec::new()).await;

        let (status, _) = post_json(
            app.router(),
            "/api/webhooks/not-a-uuid",
            json!({"identifier": "x@example.com", "channel": "email"}),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
