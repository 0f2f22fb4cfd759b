//! Action: one step of an automation's chain.
//!
//! On the wire an action is `{id, type, config, next_action_id?}`; the
//! `config` object is decoded according to `type`. Types this crate does not
//! know decode to [`ActionKind::Unknown`] so that one bad action cannot
//! prevent the rest of a store from loading; validation rejects them later.

use std::collections::BTreeMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::condition::Condition;

/// Identifier of an action, unique within its automation (e.g. `"1"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(String);

impl ActionId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ActionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ActionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A step in an automation, linked forward through `next_action_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAction", into = "RawAction")]
pub struct AutomationAction {
    pub id: ActionId,
    pub kind: ActionKind,
    pub next_action_id: Option<ActionId>,
}

impl AutomationAction {
    #[must_use]
    pub fn new(id: impl Into<ActionId>, kind: ActionKind) -> Self {
        Self {
            id: id.into(),
            kind,
            next_action_id: None,
        }
    }

    /// Chain this action to `next`.
    #[must_use]
    pub fn then(mut self, next: impl Into<ActionId>) -> Self {
        self.next_action_id = Some(next.into());
        self
    }
}

/// Type-specific behaviour of an action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    SendMessage(SendMessageConfig),
    AddTag(TagConfig),
    RemoveTag(TagConfig),
    UpdateField(UpdateFieldConfig),
    Delay(DelayConfig),
    Condition(ConditionConfig),
    Webhook(WebhookConfig),
    TransferHuman(TransferHumanConfig),
    /// A `type` this version does not understand, kept verbatim.
    Unknown { action_type: String, config: Value },
}

impl ActionKind {
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::SendMessage(_) => "send_message",
            Self::AddTag(_) => "add_tag",
            Self::RemoveTag(_) => "remove_tag",
            Self::UpdateField(_) => "update_field",
            Self::Delay(_) => "delay",
            Self::Condition(_) => "condition",
            Self::Webhook(_) => "webhook",
            Self::TransferHuman(_) => "transfer_human",
            Self::Unknown { action_type, .. } => action_type,
        }
    }

    /// Shorthand for a plain-text `send_message`.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self::SendMessage(SendMessageConfig {
            content: content.into(),
            ..SendMessageConfig::default()
        })
    }

    #[must_use]
    pub fn add_tag(tag: impl Into<String>) -> Self {
        Self::AddTag(TagConfig { tag: tag.into() })
    }

    #[must_use]
    pub fn remove_tag(tag: impl Into<String>) -> Self {
        Self::RemoveTag(TagConfig { tag: tag.into() })
    }

    #[must_use]
    pub fn delay(duration: u64, unit: DelayUnit) -> Self {
        Self::Delay(DelayConfig { duration, unit })
    }

    fn from_parts(action_type: &str, config: Value) -> Result<Self, serde_json::Error> {
        let config = if config.is_null() {
            Value::Object(Map::new())
        } else {
            config
        };
        Ok(match action_type {
            "send_message" => Self::SendMessage(serde_json::from_value(config)?),
            "add_tag" => Self::AddTag(serde_json::from_value(config)?),
            "remove_tag" => Self::RemoveTag(serde_json::from_value(config)?),
            "update_field" => Self::UpdateField(serde_json::from_value(config)?),
            "delay" => Self::Delay(serde_json::from_value(config)?),
            "condition" => Self::Condition(serde_json::from_value(config)?),
            "webhook" => Self::Webhook(serde_json::from_value(config)?),
            "transfer_human" => Self::TransferHuman(serde_json::from_value(config)?),
            other => Self::Unknown {
                action_type: other.to_string(),
                config,
            },
        })
    }

    fn to_config(&self) -> Value {
        let encoded = match self {
            Self::SendMessage(c) => serde_json::to_value(c),
            Self::AddTag(c) | Self::RemoveTag(c) => serde_json::to_value(c),
            Self::UpdateField(c) => serde_json::to_value(c),
            Self::Delay(c) => serde_json::to_value(c),
            Self::Condition(c) => serde_json::to_value(c),
            Self::Webhook(c) => serde_json::to_value(c),
            Self::TransferHuman(c) => serde_json::to_value(c),
            Self::Unknown { config, .. } => Ok(config.clone()),
        };
        // Config structs hold only JSON-representable data.
        encoded.unwrap_or(Value::Null)
    }
}

/// Shape of the rendered message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    Video,
    Audio,
    Document,
    Template,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendMessageConfig {
    /// Inline text, used when no `template_id` is given.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(default)]
    pub variables: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagConfig {
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateFieldConfig {
    pub field: String,
    pub value: Value,
}

/// Unit of a `delay` action's duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl DelayUnit {
    fn seconds(self) -> i64 {
        match self {
            Self::Seconds => 1,
            Self::Minutes => 60,
            Self::Hours => 3_600,
            Self::Days => 86_400,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayConfig {
    pub duration: u64,
    pub unit: DelayUnit,
}

impl DelayConfig {
    /// `duration · unit`, or `None` when it does not fit a timestamp offset.
    #[must_use]
    pub fn as_duration(&self) -> Option<Duration> {
        let amount = i64::try_from(self.duration).ok()?;
        let seconds = amount.checked_mul(self.unit.seconds())?;
        Duration::try_seconds(seconds)
    }
}

/// Branching step. Both branches are leaves: they never rejoin the parent chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionConfig {
    #[serde(flatten)]
    pub condition: Condition,
    #[serde(default)]
    pub true_actions: Vec<ActionId>,
    #[serde(default)]
    pub false_actions: Vec<ActionId>,
}

/// HTTP verb for a `webhook` action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Request body; the engine sends a default envelope when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferHumanConfig {
    /// Optional note shown to the agent picking up the conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct RawAction {
    id: ActionId,
    #[serde(rename = "type")]
    action_type: String,
    #[serde(default)]
    config: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    next_action_id: Option<ActionId>,
}

impl TryFrom<RawAction> for AutomationAction {
    type Error = serde_json::Error;

    fn try_from(raw: RawAction) -> Result<Self, Self::Error> {
        Ok(Self {
            kind: ActionKind::from_parts(&raw.action_type, raw.config)?,
            id: raw.id,
            next_action_id: raw.next_action_id,
        })
    }
}

impl From<AutomationAction> for RawAction {
    fn from(action: AutomationAction) -> Self {
        Self {
            action_type: action.kind.type_name().to_string(),
            config: action.kind.to_config(),
            id: action.id,
            next_action_id: action.next_action_id,
        }
    }
}

impl std::fmt::Display for AutomationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.kind.type_name(), self.id)
    }
}
