//! Webhook transport errors.

use convoflow_domain::error::ConvoFlowError;

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The client could not be built, or the request failed or timed out.
    #[error("webhook request failed")]
    Http(#[from] reqwest::Error),

    #[error("invalid header {name:?}")]
    InvalidHeader { name: String },
}

impl From<WebhookError> for ConvoFlowError {
    fn from(err: WebhookError) -> Self {
        Self::Storage(Box::new(err))
    }
}
