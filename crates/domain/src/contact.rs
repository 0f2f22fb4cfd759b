//! Contact: the person an automation acts upon.
//!
//! A contact is identified per owner by a channel-specific identifier
//! (a phone number for WhatsApp/SMS, a handle for Telegram, …). It carries a
//! duplicate-free tag set and free-form custom fields that triggers and
//! `condition` actions read.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConvoFlowError, ValidationError};
use crate::id::{AutomationId, ContactId, OwnerId};
use crate::time::Timestamp;

/// Messaging transport a contact is reached on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Whatsapp,
    Telegram,
    Instagram,
    Messenger,
    Sms,
    Email,
    Webchat,
}

impl Channel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Whatsapp => "whatsapp",
            Self::Telegram => "telegram",
            Self::Instagram => "instagram",
            Self::Messenger => "messenger",
            Self::Sms => "sms",
            Self::Email => "email",
            Self::Webchat => "webchat",
        }
    }

    /// Whether the channel identifier is a phone number.
    #[must_use]
    pub fn uses_phone_identifier(self) -> bool {
        matches!(self, Self::Whatsapp | Self::Sms)
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Channel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(Value::String(s.to_string()))
            .map_err(|_| ValidationError::InvalidChannel(s.to_string()))
    }
}

/// A person reachable on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub owner_id: OwnerId,
    /// Channel-specific address, e.g. `"5511999999999"`.
    pub identifier: String,
    pub channel: Channel,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub custom_fields: Map<String, Value>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Contact {
    /// Create a contact for `identifier` on `channel`.
    ///
    /// Phone-addressed channels also record the identifier as the phone.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyIdentifier`] when `identifier` is blank.
    pub fn new(
        owner_id: OwnerId,
        identifier: impl Into<String>,
        channel: Channel,
        at: Timestamp,
    ) -> Result<Self, ConvoFlowError> {
        let identifier = identifier.into();
        if identifier.trim().is_empty() {
            return Err(ValidationError::EmptyIdentifier.into());
        }
        let phone = channel.uses_phone_identifier().then(|| identifier.clone());
        Ok(Self {
            id: ContactId::new(),
            owner_id,
            identifier,
            channel,
            name: None,
            phone,
            email: None,
            tags: BTreeSet::new(),
            custom_fields: Map::new(),
            created_at: at,
            updated_at: at,
        })
    }

    /// Add a tag. Returns `false` when the tag was already present.
    pub fn add_tag(&mut self, tag: impl Into<String>) -> bool {
        self.tags.insert(tag.into())
    }

    /// Remove a tag. Returns `false` when the tag was absent.
    pub fn remove_tag(&mut self, tag: &str) -> bool {
        self.tags.remove(tag)
    }

    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Whether every tag in `required` is carried by this contact.
    pub fn has_all_tags<'a>(&self, required: impl IntoIterator<Item = &'a String>) -> bool {
        required.into_iter().all(|tag| self.tags.contains(tag))
    }

    /// Upsert a custom field.
    pub fn set_field(&mut self, key: impl Into<String>, value: Value) {
        self.custom_fields.insert(key.into(), value);
    }

    /// Look up a field by name.
    ///
    /// `name`, `phone` and `email` resolve to the built-in fields; anything
    /// else is read from the custom fields. Missing values yield `None`.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<Value> {
        match key {
            "name" => self.name.clone().map(Value::String),
            "phone" => self.phone.clone().map(Value::String),
            "email" => self.email.clone().map(Value::String),
            _ => self.custom_fields.get(key).cloned(),
        }
    }
}

/// A partial update applied to a stored contact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactPatch {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub add_tags: Vec<String>,
    #[serde(default)]
    pub remove_tags: Vec<String>,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl ContactPatch {
    #[must_use]
    pub fn add_tag(tag: impl Into<String>) -> Self {
        Self {
            add_tags: vec![tag.into()],
            ..Self::default()
        }
    }

    #[must_use]
    pub fn remove_tag(tag: impl Into<String>) -> Self {
        Self {
            remove_tags: vec![tag.into()],
            ..Self::default()
        }
    }

    #[must_use]
    pub fn field(key: impl Into<String>, value: Value) -> Self {
        let mut fields = Map::new();
        fields.insert(key.into(), value);
        Self {
            fields,
            ..Self::default()
        }
    }

    /// Apply the patch in place. Tag additions and removals are idempotent.
    pub fn apply(self, contact: &mut Contact, at: Timestamp) {
        if let Some(name) = self.name {
            contact.name = Some(name);
        }
        if let Some(phone) = self.phone {
            contact.phone = Some(phone);
        }
        if let Some(email) = self.email {
            contact.email = Some(email);
        }
        for tag in self.add_tags {
            contact.add_tag(tag);
        }
        for tag in &self.remove_tags {
            contact.remove_tag(tag);
        }
        for (key, value) in self.fields {
            contact.set_field(key, value);
        }
        contact.updated_at = at;
    }
}

/// Record of a message handed to a channel, kept for the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub owner_id: OwnerId,
    pub contact_id: ContactId,
    pub automation_id: Option<AutomationId>,
    pub channel: Channel,
    pub content: String,
    pub media_url: Option<String>,
    pub external_id: Option<String>,
    pub sent_at: Timestamp,
}
