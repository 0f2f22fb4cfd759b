//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into
//! [`ConvoFlowError`] via `#[from]`. Adapters box their own error types into
//! [`ConvoFlowError::Storage`].

use crate::automation::ActionId;
use crate::contact::Channel;
use crate::job::JobStatus;

/// Top-level error returned by domain and application operations.
#[derive(Debug, thiserror::Error)]
pub enum ConvoFlowError {
    /// A value failed domain invariant checks.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A looked-up record does not exist.
    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    /// An automation definition is structurally broken.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// An action's side effect failed while walking an automation.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// A queue job was asked to make an illegal status transition.
    #[error(transparent)]
    JobState(#[from] JobStateError),

    /// A channel refused or failed to deliver an outbound message.
    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// A persistence or transport adapter failed.
    #[error("storage error: {0}")]
    Storage(Box<dyn std::error::Error + Send + Sync>),
}

/// Invariant violations on plain values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("automation must contain at least one action")]
    NoActions,

    #[error("contact identifier must not be empty")]
    EmptyIdentifier,

    #[error("invalid schedule time {0:?}, expected HH:MM")]
    InvalidScheduleTime(String),

    #[error("invalid identifier {0:?}")]
    InvalidId(String),

    #[error("unknown channel {0:?}")]
    InvalidChannel(String),

    #[error("unknown job type {0:?}")]
    InvalidJobType(String),

    #[error("unknown job status {0:?}")]
    InvalidJobStatus(String),

    #[error("max_attempts must be at least 1")]
    ZeroMaxAttempts,

    #[error("invalid {job_type} job payload: {reason}")]
    InvalidPayload {
        job_type: &'static str,
        reason: String,
    },
}

/// A record could not be found.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// A broken action chain. The walk halts; the automation is left alone.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("duplicate action id {0}")]
    DuplicateActionId(ActionId),

    #[error("action {from} references missing action {to}")]
    DanglingReference { from: ActionId, to: ActionId },

    #[error("action {0} has an unknown type")]
    UnknownActionType(ActionId),

    #[error("action {0} is reached twice, chains must be forward-only")]
    Cycle(ActionId),

    #[error("automation has no action {0}")]
    MissingAction(ActionId),

    #[error("delay of action {0} is out of range")]
    InvalidDelay(ActionId),
}

/// A collaborator failed while an action was executing.
#[derive(Debug, thiserror::Error)]
#[error("action {action_id} failed: {message}")]
pub struct ExecutionError {
    pub action_id: ActionId,
    pub message: String,
    #[source]
    pub source: Option<Box<ConvoFlowError>>,
}

impl ExecutionError {
    /// Wrap a collaborator error raised while executing `action_id`.
    #[must_use]
    pub fn caused_by(action_id: ActionId, source: ConvoFlowError) -> Self {
        Self {
            action_id,
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }
}

/// Illegal job status transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("job cannot move from {from} to {to}")]
pub struct JobStateError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Outbound message delivery failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("delivery on {channel} failed: {reason}")]
pub struct DeliveryError {
    pub channel: Channel,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_convert_validation_error_into_top_level_error() {
        let err: ConvoFlowError = ValidationError::EmptyName.into();
        assert!(matches!(
            err,
            ConvoFlowError::Validation(ValidationError::EmptyName)
        ));
    }

    #[test]
    fn should_describe_dangling_reference() {
        let err = ConfigurationError::DanglingReference {
            from: ActionId::from("1"),
            to: ActionId::from("9"),
        };
        assert_eq!(err.to_string(), "action 1 references missing action 9");
    }

    #[test]
    fn should_keep_source_message_when_wrapping_execution_error() {
        let source: ConvoFlowError = NotFoundError {
            entity: "Contact",
            id: "abc".to_string(),
        }
        .into();
        let err = ExecutionError::caused_by(ActionId::from("2"), source);
        assert_eq!(err.message, "Contact abc not found");
        assert!(err.source.is_some());
    }
}
