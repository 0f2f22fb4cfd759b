//! Messaging ports: delivering outbound messages and rendering their text.

use std::future::Future;

use convoflow_domain::automation::MessageType;
use convoflow_domain::contact::{Channel, Contact};
use convoflow_domain::error::ConvoFlowError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A rendered message ready for a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub channel: Channel,
    pub recipient: String,
    pub message_type: MessageType,
    pub content: String,
    pub media_url: Option<String>,
}

/// What the channel reported back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub success: bool,
    pub external_id: Option<String>,
    pub error: Option<String>,
}

impl DeliveryReceipt {
    #[must_use]
    pub fn delivered(external_id: impl Into<String>) -> Self {
        Self {
            success: true,
            external_id: Some(external_id.into()),
            error: None,
        }
    }

    #[must_use]
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            external_id: None,
            error: Some(error.into()),
        }
    }
}

/// Sends messages on an external messaging transport.
pub trait ChannelSender {
    /// Attempt delivery. A transport that answered but refused the message
    /// returns `Ok` with `success == false`.
    fn send(
        &self,
        message: &OutgoingMessage,
    ) -> impl Future<Output = Result<DeliveryReceipt, ConvoFlowError>> + Send;
}

/// Source text of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTemplate<'a> {
    /// A template stored under this id.
    Stored(&'a str),
    /// Text written directly in the action.
    Inline(&'a str),
}

/// Turns templates into final message text for a contact.
pub trait TemplateRenderer {
    fn render(
        &self,
        template: MessageTemplate<'_>,
        contact: &Contact,
        variables: &Map<String, Value>,
    ) -> impl Future<Output = Result<String, ConvoFlowError>> + Send;
}
