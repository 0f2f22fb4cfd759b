//! Job store port: durable record of queue jobs.

use std::future::Future;

use convoflow_domain::error::ConvoFlowError;
use convoflow_domain::id::JobId;
use convoflow_domain::job::QueueJob;

/// Persists [`QueueJob`]s so the queue can be rebuilt after a restart.
pub trait JobStore {
    /// Insert or replace a job.
    fn save(&self, job: &QueueJob) -> impl Future<Output = Result<(), ConvoFlowError>> + Send;

    fn get(&self, id: JobId)
    -> impl Future<Output = Result<Option<QueueJob>, ConvoFlowError>> + Send;

    /// Jobs that are `pending` or `processing`, oldest first.
    fn list_unfinished(&self) -> impl Future<Output = Result<Vec<QueueJob>, ConvoFlowError>> + Send;
}
