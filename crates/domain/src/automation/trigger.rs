//! Trigger: the event pattern that activates an automation.

use chrono::{Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::contact::Contact;
use crate::error::ValidationError;
use crate::event::TriggerEvent;
use crate::time::Timestamp;

const SECONDS_PER_DAY: i64 = 86_400;

/// The condition class activating an automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Keyword,
    Schedule,
    Webhook,
    ButtonClick,
    FlowStart,
}

impl TriggerType {
    pub const ALL: [Self; 5] = [
        Self::Keyword,
        Self::Schedule,
        Self::Webhook,
        Self::ButtonClick,
        Self::FlowStart,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Schedule => "schedule",
            Self::Webhook => "webhook",
            Self::ButtonClick => "button_click",
            Self::FlowStart => "flow_start",
        }
    }
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Describes what activates an automation, with its type-specific config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Fires when an inbound message contains any keyword (case-insensitive).
    Keyword { keywords: Vec<String> },
    /// Fires once a day at `time` (`HH:MM`) for an audience of contacts.
    Schedule {
        time: String,
        /// Weekdays on which to fire; empty means every day.
        #[serde(default)]
        days: Vec<Weekday>,
        /// Offset of the operator's local time from UTC.
        #[serde(default)]
        utc_offset_minutes: i32,
        /// Contacts carrying all these tags are targeted; empty means everyone.
        #[serde(default)]
        audience_tags: Vec<String>,
    },
    /// Fires when the automation's webhook endpoint is called.
    Webhook,
    /// Fires when the contact presses a button carrying `payload`.
    ButtonClick { payload: String },
    /// Fires when the contact carries the required tags and field values.
    FlowStart {
        #[serde(default)]
        required_tags: Vec<String>,
        #[serde(default)]
        field_equals: Map<String, Value>,
    },
}

impl Trigger {
    #[must_use]
    pub fn trigger_type(&self) -> TriggerType {
        match self {
            Self::Keyword { .. } => TriggerType::Keyword,
            Self::Schedule { .. } => TriggerType::Schedule,
            Self::Webhook => TriggerType::Webhook,
            Self::ButtonClick { .. } => TriggerType::ButtonClick,
            Self::FlowStart { .. } => TriggerType::FlowStart,
        }
    }

    /// Check whether this trigger matches an inbound event for a contact.
    ///
    /// `Schedule` and `Webhook` triggers never match here; the schedule
    /// scanner and the webhook intake activate them directly.
    #[must_use]
    pub fn matches(&self, contact: &Contact, event: &TriggerEvent) -> bool {
        match self {
            Self::Keyword { keywords } => event
                .text()
                .is_some_and(|text| keyword_matches(keywords, text)),
            Self::ButtonClick { payload } => event.button_payload() == Some(payload.as_str()),
            Self::FlowStart {
                required_tags,
                field_equals,
            } => {
                contact.has_all_tags(required_tags)
                    && field_equals
                        .iter()
                        .all(|(key, expected)| contact.field(key).as_ref() == Some(expected))
            }
            Self::Schedule { .. } | Self::Webhook => false,
        }
    }

    /// For schedule triggers, the local date whose firing window contains
    /// `now`, or `None` when the trigger is not due.
    ///
    /// The window opens at the configured time and stays open for `tolerance`,
    /// possibly past midnight. The weekday filter applies to the day the
    /// window opened on.
    #[must_use]
    pub fn schedule_due(&self, now: Timestamp, tolerance: Duration) -> Option<NaiveDate> {
        let Self::Schedule {
            time,
            days,
            utc_offset_minutes,
            ..
        } = self
        else {
            return None;
        };
        let at = parse_schedule_time(time).ok()?;
        let offset = FixedOffset::east_opt(utc_offset_minutes.checked_mul(60)?)?;
        let local = now.with_timezone(&offset);
        let seconds_into_day = i64::from(local.num_seconds_from_midnight());
        let target = i64::from(at.num_seconds_from_midnight());
        let elapsed = (seconds_into_day - target).rem_euclid(SECONDS_PER_DAY);
        if elapsed > tolerance.num_seconds() {
            return None;
        }
        let opened_on = (local - Duration::seconds(elapsed)).date_naive();
        if !days.is_empty() && !days.contains(&opened_on.weekday()) {
            return None;
        }
        Some(opened_on)
    }
}

/// Whether `text` contains any of `keywords`, ignoring case. Empty keywords
/// never match.
#[must_use]
pub fn keyword_matches(keywords: &[String], text: &str) -> bool {
    let text = text.to_lowercase();
    keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .any(|k| text.contains(&k))
}

/// Parse an `HH:MM` schedule time.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidScheduleTime`] for anything else.
pub fn parse_schedule_time(value: &str) -> Result<NaiveTime, ValidationError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| ValidationError::InvalidScheduleTime(value.to_string()))
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Keyword { keywords } => write!(f, "keyword({})", keywords.join("|")),
            Self::Schedule { time, .. } => write!(f, "schedule({time})"),
            Self::Webhook => f.write_str("webhook"),
            Self::ButtonClick { payload } => write!(f, "button_click({payload})"),
            Self::FlowStart { .. } => f.write_str("flow_start"),
        }
    }
}
