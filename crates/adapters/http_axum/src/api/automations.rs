//! Manual execution of an automation and registry inspection.

use std::str::FromStr;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use convoflow_app::executor::WalkOutcome;
use convoflow_app::ports::{ContactStore, EnginePorts};
use convoflow_app::registry::QuarantinedAutomation;
use convoflow_domain::error::{ConvoFlowError, NotFoundError};
use convoflow_domain::event::{TriggerEvent, TriggerEventKind};
use convoflow_domain::id::{AutomationId, ContactId};
use convoflow_domain::time::Clock;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for a manual run.
#[derive(Deserialize)]
pub struct ExecuteRequest {
    pub contact_id: ContactId,
}

/// Possible responses from the execute endpoint.
pub enum ExecuteResponse {
    Ok(Json<WalkOutcome>),
}

impl IntoResponse for ExecuteResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Ok(json) => json.into_response(),
        }
    }
}

fn contact_not_found(id: ContactId) -> ConvoFlowError {
    NotFoundError {
        entity: "Contact",
        id: id.to_string(),
    }
    .into()
}

/// `POST /api/automations/{id}/execute`
///
/// Runs the automation from its entry action, bypassing trigger matching.
/// The contact must belong to the automation's owner.
pub async fn execute<P: EnginePorts>(
    State(state): State<AppState<P>>,
    Path(id): Path<String>,
    Json(body): Json<ExecuteRequest>,
) -> Result<ExecuteResponse, ApiError> {
    let automation_id = AutomationId::from_str(&id).map_err(|_| ApiError::invalid_id(&id))?;
    let contact = state
        .engine
        .ports()
        .contacts()
        .get(body.contact_id)
        .await?
        .ok_or_else(|| contact_not_found(body.contact_id))?;
    if let Some(automation) = state.engine.registry().get(automation_id)
        && automation.owner_id() != contact.owner_id
    {
        return Err(contact_not_found(body.contact_id).into());
    }

    let event = TriggerEvent {
        owner_id: contact.owner_id,
        channel: contact.channel,
        kind: TriggerEventKind::Manual,
        received_at: state.engine.ports().clock().now(),
    };
    let outcome = state
        .engine
        .execute_automation(automation_id, contact, Some(event))
        .await?;
    Ok(ExecuteResponse::Ok(Json(outcome)))
}

/// `GET /api/automations/quarantined`: stored automations kept out of
/// matching, with the reason.
pub async fn quarantined<P: EnginePorts>(
    State(state): State<AppState<P>>,
) -> Json<Vec<QuarantinedAutomation>> {
    Json(state.engine.registry().quarantined())
}
