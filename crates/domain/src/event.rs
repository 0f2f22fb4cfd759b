//! Events: what comes in (trigger events) and what the engine announces.
//!
//! A [`TriggerEvent`] is the inbound occurrence an automation reacts to: a
//! message, a button click, a webhook call, a schedule tick or a manual run.
//! An [`Event`] is an immutable notification the engine publishes on the
//! event bus (handoff requested, job finished, …).

use serde::{Deserialize, Serialize};

use crate::contact::Channel;
use crate::id::{AutomationId, ContactId, EventId, OwnerId};
use crate::time::{Timestamp, now};

/// Inbound occurrence that may activate automations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub owner_id: OwnerId,
    pub channel: Channel,
    pub kind: TriggerEventKind,
    pub received_at: Timestamp,
}

/// What kind of occurrence a [`TriggerEvent`] records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerEventKind {
    /// The contact sent a text message.
    Message { text: String },
    /// The contact pressed an interactive button.
    ButtonClick { payload: String },
    /// An external system called the webhook of a specific automation.
    Webhook {
        automation_id: AutomationId,
        #[serde(default)]
        data: serde_json::Value,
    },
    /// The schedule scanner fired.
    Schedule { fired_at: Timestamp },
    /// An operator ran the automation by hand.
    Manual,
}

impl TriggerEvent {
    #[must_use]
    pub fn new(owner_id: OwnerId, channel: Channel, kind: TriggerEventKind) -> Self {
        Self {
            owner_id,
            channel,
            kind,
            received_at: now(),
        }
    }

    #[must_use]
    pub fn message(owner_id: OwnerId, channel: Channel, text: impl Into<String>) -> Self {
        Self::new(
            owner_id,
            channel,
            TriggerEventKind::Message { text: text.into() },
        )
    }

    #[must_use]
    pub fn button_click(owner_id: OwnerId, channel: Channel, payload: impl Into<String>) -> Self {
        Self::new(
            owner_id,
            channel,
            TriggerEventKind::ButtonClick {
                payload: payload.into(),
            },
        )
    }

    /// Message text, if this is a message event.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            TriggerEventKind::Message { text } => Some(text),
            _ => None,
        }
    }

    /// Button payload, if this is a button click.
    #[must_use]
    pub fn button_payload(&self) -> Option<&str> {
        match &self.kind {
            TriggerEventKind::ButtonClick { payload } => Some(payload),
            _ => None,
        }
    }
}

/// Discriminator for [`Event`]s published by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AutomationTriggered,
    AutomationCompleted,
    AutomationFailed,
    HumanHandoffRequested,
    JobCompleted,
    JobFailed,
}

impl EventType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AutomationTriggered => "automation_triggered",
            Self::AutomationCompleted => "automation_completed",
            Self::AutomationFailed => "automation_failed",
            Self::HumanHandoffRequested => "human_handoff_requested",
            Self::JobCompleted => "job_completed",
            Self::JobFailed => "job_failed",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification published by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub event_type: EventType,
    pub contact_id: Option<ContactId>,
    pub timestamp: Timestamp,
    pub data: serde_json::Value,
}

impl Event {
    #[must_use]
    pub fn new(
        event_type: EventType,
        contact_id: Option<ContactId>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: EventId::new(),
            event_type,
            contact_id,
            timestamp: now(),
            data,
        }
    }
}
