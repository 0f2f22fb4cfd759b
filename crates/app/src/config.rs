//! Tuning knobs for the queue and the engine.

use std::collections::HashMap;
use std::time::Duration;

use convoflow_domain::job::{DEFAULT_MAX_ATTEMPTS, JobType, RetryPolicy};

/// Queue manager settings.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Period of each per-type dispatch loop.
    pub poll_interval: Duration,
    /// Period of the delayed-job sweep.
    pub sweep_interval: Duration,
    /// Jobs dispatched per tick for types without an override.
    pub max_concurrent: usize,
    pub max_concurrent_overrides: HashMap<JobType, usize>,
    pub retry: RetryPolicy,
    /// `max_attempts` given to jobs the engine creates.
    pub default_max_attempts: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            sweep_interval: Duration::from_secs(60),
            max_concurrent: 5,
            max_concurrent_overrides: HashMap::new(),
            retry: RetryPolicy::default(),
            default_max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl QueueConfig {
    #[must_use]
    pub fn max_concurrent_for(&self, job_type: JobType) -> usize {
        self.max_concurrent_overrides
            .get(&job_type)
            .copied()
            .unwrap_or(self.max_concurrent)
            .max(1)
    }
}

/// Action executor and engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on a single `webhook` action call.
    pub webhook_timeout: Duration,
    /// Tag put on contacts by `transfer_human`.
    pub handoff_tag: String,
    /// Run at most one walk at a time per contact.
    pub serialize_per_contact: bool,
    pub schedule_scan_interval: Duration,
    /// How long after its time a schedule trigger may still fire.
    pub schedule_tolerance: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            webhook_timeout: Duration::from_secs(10),
            handoff_tag: "needs_human".to_string(),
            serialize_per_contact: true,
            schedule_scan_interval: Duration::from_secs(30),
            schedule_tolerance: Duration::from_secs(60),
        }
    }
}
