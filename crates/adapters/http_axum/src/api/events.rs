//! Inbound message and button-click intake.

use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use convoflow_app::executor::WalkOutcome;
use convoflow_app::ports::EnginePorts;
use convoflow_domain::contact::Channel;
use convoflow_domain::id::OwnerId;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for an inbound text message.
#[derive(Deserialize)]
pub struct MessageRequest {
    pub owner_id: OwnerId,
    pub identifier: String,
    pub channel: Channel,
    pub text: String,
}

/// Request body for a button press.
#[derive(Deserialize)]
pub struct ButtonClickRequest {
    pub owner_id: OwnerId,
    pub identifier: String,
    pub channel: Channel,
    pub payload: String,
}

/// Possible responses from the intake endpoints.
///
/// An event matching no automation is still accepted with an empty list.
pub enum IntakeResponse {
    Ok(Json<Vec<WalkOutcome>>),
}

impl IntoResponse for IntakeResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Ok(json) => json.into_response(),
        }
    }
}

/// `POST /api/events/messages`
pub async fn message<P: EnginePorts>(
    State(state): State<AppState<P>>,
    Json(body): Json<MessageRequest>,
) -> Result<IntakeResponse, ApiError> {
    let outcomes = state
        .engine
        .handle_message(body.owner_id, &body.identifier, body.channel, &body.text)
        .await?;
    Ok(IntakeResponse::Ok(Json(outcomes)))
}

/// `POST /api/events/buttons`
pub async fn button_click<P: EnginePorts>(
    State(state): State<AppState<P>>,
    Json(body): Json<ButtonClickRequest>,
) -> Result<IntakeResponse, ApiError> {
    let outcomes = state
        .engine
        .handle_button_click(body.owner_id, &body.identifier, body.channel, &body.payload)
        .await?;
    Ok(IntakeResponse::Ok(Json(outcomes)))
}
