//! In-memory [`JobStore`], used when no persistent store is configured.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use convoflow_domain::error::ConvoFlowError;
use convoflow_domain::id::JobId;
use convoflow_domain::job::{JobStatus, QueueJob};

use crate::ports::JobStore;

/// Process-local job table. Jobs do not survive a restart.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<JobId, QueueJob>>,
}

impl InMemoryJobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored job.
    #[must_use]
    pub fn all(&self) -> Vec<QueueJob> {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<QueueJob> = jobs.values().cloned().collect();
        all.sort_by_key(|j| j.created_at);
        all
    }
}

impl JobStore for InMemoryJobStore {
    fn save(&self, job: &QueueJob) -> impl Future<Output = Result<(), ConvoFlowError>> + Send {
        self.jobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job.id, job.clone());
        async { Ok(()) }
    }

    fn get(
        &self,
        id: JobId,
    ) -> impl Future<Output = Result<Option<QueueJob>, ConvoFlowError>> + Send {
        let job = self
            .jobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned();
        async { Ok(job) }
    }

    fn list_unfinished(
        &self,
    ) -> impl Future<Output = Result<Vec<QueueJob>, ConvoFlowError>> + Send {
        let unfinished: Vec<QueueJob> = self
            .all()
            .into_iter()
            .filter(|j| matches!(j.status, JobStatus::Pending | JobStatus::Processing))
            .collect();
        async { Ok(unfinished) }
    }
}
