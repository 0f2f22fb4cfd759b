//! Analytics sink port: fire-and-forget usage records.

use std::future::Future;

use convoflow_domain::error::ConvoFlowError;
use convoflow_domain::id::OwnerId;
use serde::{Deserialize, Serialize};

/// Names of the analytics records the engine emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsEvent {
    AutomationTriggered,
    AutomationCompleted,
    AutomationFailed,
    AutomationHalted,
    HumanHandoff,
    MessageSent,
    MessageFailed,
}

impl AnalyticsEvent {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AutomationTriggered => "automation_triggered",
            Self::AutomationCompleted => "automation_completed",
            Self::AutomationFailed => "automation_failed",
            Self::AutomationHalted => "automation_halted",
            Self::HumanHandoff => "human_handoff",
            Self::MessageSent => "message_sent",
            Self::MessageFailed => "message_failed",
        }
    }
}

impl std::fmt::Display for AnalyticsEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Records analytics events for an owner.
pub trait AnalyticsSink {
    fn record(
        &self,
        owner_id: OwnerId,
        event: AnalyticsEvent,
        metadata: serde_json::Value,
    ) -> impl Future<Output = Result<(), ConvoFlowError>> + Send;
}
