//! Queue jobs: units of deferred work with retry bookkeeping.
//!
//! A [`QueueJob`] moves `pending → processing → completed | failed`, with a
//! failed attempt going back to `pending` until `max_attempts` is reached.
//! `completed` and `failed` are terminal. The retry delay follows
//! [`RetryPolicy`]: `min(base_delay · 2^(attempts-1), max_delay)`.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::automation::{ActionId, MessageType};
use crate::contact::Channel;
use crate::error::{JobStateError, ValidationError};
use crate::event::TriggerEvent;
use crate::id::{AutomationId, ContactId, JobId, OwnerId};
use crate::time::Timestamp;

pub const DEFAULT_PRIORITY: i32 = 0;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Kind of work a job carries; each type has its own queue and handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    SendMessage,
    AutomationAction,
    CampaignMessage,
}

impl JobType {
    pub const ALL: [Self; 3] = [
        Self::SendMessage,
        Self::AutomationAction,
        Self::CampaignMessage,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SendMessage => "send_message",
            Self::AutomationAction => "automation_action",
            Self::CampaignMessage => "campaign_message",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidJobType(s.to_string()))
    }
}

/// Lifecycle status of a [`QueueJob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(ValidationError::InvalidJobStatus(other.to_string())),
        }
    }
}

/// Exponential backoff between attempts of a failing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next try, given the number of attempts made so far
    /// (1-based).
    #[must_use]
    pub fn backoff(&self, attempts: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(attempts.saturating_sub(1));
        self.base_delay
            .saturating_mul(multiplier)
            .min(self.max_delay)
    }
}

/// What happened to a job after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Back to `pending`, due again at `at`.
    Retry { at: Timestamp, backoff: Duration },
    /// `max_attempts` reached; the job is `failed`.
    Exhausted,
}

/// A persisted unit of deferred work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueJob {
    pub id: JobId,
    pub owner_id: OwnerId,
    pub job_type: JobType,
    /// Higher runs first.
    pub priority: i32,
    pub payload: serde_json::Value,
    pub scheduled_at: Timestamp,
    pub attempts: u32,
    pub max_attempts: u32,
    pub status: JobStatus,
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl QueueJob {
    /// A pending job due at `at`, with default priority and attempt budget.
    #[must_use]
    pub fn new(
        owner_id: OwnerId,
        job_type: JobType,
        payload: serde_json::Value,
        at: Timestamp,
    ) -> Self {
        Self {
            id: JobId::new(),
            owner_id,
            job_type,
            priority: DEFAULT_PRIORITY,
            payload,
            scheduled_at: at,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            status: JobStatus::Pending,
            error: None,
            created_at: at,
            completed_at: None,
        }
    }

    /// Continuation job resuming a suspended walk at `resume_at`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidPayload`] if the payload cannot be encoded.
    pub fn continuation(
        owner_id: OwnerId,
        payload: &ContinuationPayload,
        created_at: Timestamp,
        resume_at: Timestamp,
    ) -> Result<Self, ValidationError> {
        let mut job = Self::new(
            owner_id,
            JobType::AutomationAction,
            encode(JobType::AutomationAction, payload)?,
            created_at,
        );
        job.scheduled_at = resume_at;
        Ok(job)
    }

    /// Immediate outbound message dispatch.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidPayload`] if the payload cannot be encoded.
    pub fn send_message(
        owner_id: OwnerId,
        payload: &SendMessagePayload,
        at: Timestamp,
    ) -> Result<Self, ValidationError> {
        Ok(Self::new(
            owner_id,
            JobType::SendMessage,
            encode(JobType::SendMessage, payload)?,
            at,
        ))
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// # Errors
    ///
    /// Returns [`ValidationError::ZeroMaxAttempts`] when `max_attempts` is 0.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Result<Self, ValidationError> {
        if max_attempts == 0 {
            return Err(ValidationError::ZeroMaxAttempts);
        }
        self.max_attempts = max_attempts;
        Ok(self)
    }

    /// Decode the payload into its typed form.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidPayload`] when the payload does not fit `T`.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, ValidationError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| ValidationError::InvalidPayload {
            job_type: self.job_type.as_str(),
            reason: e.to_string(),
        })
    }

    #[must_use]
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.scheduled_at <= now
    }

    /// `pending → processing`.
    ///
    /// # Errors
    ///
    /// Returns [`JobStateError`] from any other status.
    pub fn mark_processing(&mut self) -> Result<(), JobStateError> {
        self.transition(JobStatus::Pending, JobStatus::Processing)
    }

    /// `processing → completed`.
    ///
    /// # Errors
    ///
    /// Returns [`JobStateError`] from any other status.
    pub fn mark_completed(&mut self, at: Timestamp) -> Result<(), JobStateError> {
        self.transition(JobStatus::Processing, JobStatus::Completed)?;
        self.completed_at = Some(at);
        self.error = None;
        Ok(())
    }

    /// Count a failed attempt and decide between retry and terminal failure.
    ///
    /// # Errors
    ///
    /// Returns [`JobStateError`] unless the job is `processing`.
    pub fn record_failure(
        &mut self,
        error: impl Into<String>,
        policy: &RetryPolicy,
        now: Timestamp,
    ) -> Result<FailureOutcome, JobStateError> {
        if self.status != JobStatus::Processing {
            return Err(JobStateError {
                from: self.status,
                to: JobStatus::Pending,
            });
        }
        self.attempts = (self.attempts + 1).min(self.max_attempts);
        self.error = Some(error.into());
        if self.attempts < self.max_attempts {
            let backoff = policy.backoff(self.attempts);
            let at = chrono::Duration::from_std(backoff)
                .ok()
                .and_then(|d| now.checked_add_signed(d))
                .unwrap_or(now);
            self.status = JobStatus::Pending;
            self.scheduled_at = at;
            Ok(FailureOutcome::Retry { at, backoff })
        } else {
            self.status = JobStatus::Failed;
            self.completed_at = Some(now);
            Ok(FailureOutcome::Exhausted)
        }
    }

    /// Fail without retry, e.g. when no handler exists for the job type.
    ///
    /// # Errors
    ///
    /// Returns [`JobStateError`] when the job is already terminal.
    pub fn fail_permanently(
        &mut self,
        error: impl Into<String>,
        now: Timestamp,
    ) -> Result<(), JobStateError> {
        if self.status.is_terminal() {
            return Err(JobStateError {
                from: self.status,
                to: JobStatus::Failed,
            });
        }
        if self.status == JobStatus::Processing {
            self.attempts = (self.attempts + 1).min(self.max_attempts);
        }
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(now);
        Ok(())
    }

    /// Return a job interrupted mid-flight to `pending`.
    ///
    /// # Errors
    ///
    /// Returns [`JobStateError`] unless the job is `processing`.
    pub fn reset_interrupted(&mut self) -> Result<(), JobStateError> {
        self.transition(JobStatus::Processing, JobStatus::Pending)
    }

    fn transition(&mut self, from: JobStatus, to: JobStatus) -> Result<(), JobStateError> {
        if self.status != from {
            return Err(JobStateError {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

fn encode<T: Serialize>(
    job_type: JobType,
    payload: &T,
) -> Result<serde_json::Value, ValidationError> {
    serde_json::to_value(payload).map_err(|e| ValidationError::InvalidPayload {
        job_type: job_type.as_str(),
        reason: e.to_string(),
    })
}

/// Resumable state of a walk suspended by a `delay` action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuationPayload {
    pub automation_id: AutomationId,
    pub contact_id: ContactId,
    /// Action the walk resumes at.
    pub action_id: ActionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_event: Option<TriggerEvent>,
}

/// Rendered outbound message waiting for dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMessagePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automation_id: Option<AutomationId>,
    pub contact_id: ContactId,
    pub channel: Channel,
    pub recipient: String,
    #[serde(default)]
    pub message_type: MessageType,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::now;

    fn processing_job(max_attempts: u32) -> QueueJob {
        let mut job = QueueJob::new(
            OwnerId::new(),
            JobType::SendMessage,
            serde_json::json!({}),
            now(),
        )
        .with_max_attempts(max_attempts)
        .unwrap();
        job.mark_processing().unwrap();
        job
    }

    #[test]
    fn should_name_the_bad_value_when_parsing_unknown_type_or_status() {
        assert_eq!(
            "bulk_import".parse::<JobType>(),
            Err(ValidationError::InvalidJobType("bulk_import".to_string()))
        );
        assert_eq!(
            "paused".parse::<JobStatus>(),
            Err(ValidationError::InvalidJobStatus("paused".to_string()))
        );
        assert_eq!("send_message".parse::<JobType>(), Ok(JobType::SendMessage));
        assert_eq!("failed".parse::<JobStatus>(), Ok(JobStatus::Failed));
    }

    #[test]
    fn should_double_backoff_until_cap() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        };
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(policy.backoff(4), Duration::from_secs(5));
        assert_eq!(policy.backoff(40), Duration::from_secs(5));
    }

    #[test]
    fn should_fail_after_exactly_max_attempts() {
        let policy = RetryPolicy::default();
        let start = now();
        let mut job = processing_job(3);

        let first = job.record_failure("boom", &policy, start).unwrap();
        assert_eq!(
            first,
            FailureOutcome::Retry {
                at: start + chrono::Duration::seconds(1),
                backoff: Duration::from_secs(1),
            }
        );
        assert_eq!(job.status, JobStatus::Pending);

        job.mark_processing().unwrap();
        let second = job.record_failure("boom", &policy, start).unwrap();
        assert!(matches!(second, FailureOutcome::Retry { backoff, .. } if backoff == Duration::from_secs(2)));

        job.mark_processing().unwrap();
        let third = job.record_failure("boom", &policy, start).unwrap();
        assert_eq!(third, FailureOutcome::Exhausted);
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 3);
        assert!(job.mark_processing().is_err());
    }

    #[test]
    fn should_reject_completion_when_job_is_not_processing() {
        let mut job = QueueJob::new(OwnerId::new(), JobType::SendMessage, serde_json::json!({}), now());
        let err = job.mark_completed(now()).unwrap_err();
        assert_eq!(err.from, JobStatus::Pending);
        assert_eq!(err.to, JobStatus::Completed);
    }

    #[test]
    fn should_keep_completed_terminal() {
        let mut job = processing_job(3);
        job.mark_completed(now()).unwrap();
        assert!(job.completed_at.is_some());
        assert!(job.fail_permanently("late", now()).is_err());
        assert!(job.record_failure("late", &RetryPolicy::default(), now()).is_err());
    }

    #[test]
    fn should_reset_interrupted_job_to_pending() {
        let mut job = processing_job(3);
        job.reset_interrupted().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
    }

    #[test]
    fn should_reject_zero_max_attempts() {
        let result = QueueJob::new(OwnerId::new(), JobType::SendMessage, serde_json::json!({}), now())
            .with_max_attempts(0);
        assert_eq!(result.unwrap_err(), ValidationError::ZeroMaxAttempts);
    }

    #[test]
    fn should_schedule_continuation_at_resume_time() {
        let created = now();
        let resume = created + chrono::Duration::minutes(30);
        let payload = ContinuationPayload {
            automation_id: AutomationId::new(),
            contact_id: ContactId::new(),
            action_id: ActionId::from("3"),
            trigger_event: None,
        };
        let job = QueueJob::continuation(OwnerId::new(), &payload, created, resume).unwrap();

        assert_eq!(job.job_type, JobType::AutomationAction);
        assert_eq!(job.scheduled_at, resume);
        assert_eq!(job.created_at, created);
        assert!(!job.is_due(created));
        assert_eq!(job.payload["action_id"], "3");
        let decoded: ContinuationPayload = job.decode_payload().unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn should_report_invalid_payload_when_shape_does_not_match() {
        let job = QueueJob::new(
            OwnerId::new(),
            JobType::AutomationAction,
            serde_json::json!({"nope": true}),
            now(),
        );
        let err = job.decode_payload::<ContinuationPayload>().unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidPayload { job_type: "automation_action", .. }
        ));
    }

    #[test]
    fn should_parse_job_type_from_str() {
        assert_eq!("campaign_message".parse::<JobType>().unwrap(), JobType::CampaignMessage);
        assert!("fax".parse::<JobType>().is_err());
    }
}
