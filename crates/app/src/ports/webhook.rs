//! Webhook client port: outbound HTTP calls made by `webhook` actions.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use convoflow_domain::automation::HttpMethod;
use convoflow_domain::error::ConvoFlowError;

#[derive(Debug, Clone, PartialEq)]
pub struct WebhookRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    /// Sent as JSON; ignored for `GET`.
    pub body: serde_json::Value,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: u16,
    pub body: String,
}

impl WebhookResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs webhook HTTP calls.
pub trait WebhookClient {
    fn call(
        &self,
        request: WebhookRequest,
    ) -> impl Future<Output = Result<WebhookResponse, ConvoFlowError>> + Send;
}
