//! `SQLite` implementation of [`JobStore`].

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use convoflow_app::ports::JobStore;
use convoflow_domain::error::ConvoFlowError;
use convoflow_domain::id::JobId;
use convoflow_domain::job::QueueJob;

use crate::codec;
use crate::error::StorageError;

struct Wrapper(QueueJob);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let owner_id: String = row.try_get("owner_id")?;
        let job_type: String = row.try_get("job_type")?;
        let payload: String = row.try_get("payload")?;
        let scheduled_at: String = row.try_get("scheduled_at")?;
        let status: String = row.try_get("status")?;
        let created_at: String = row.try_get("created_at")?;
        let completed_at: Option<String> = row.try_get("completed_at")?;

        Ok(Self(QueueJob {
            id: codec::parse(&id)?,
            owner_id: codec::parse(&owner_id)?,
            job_type: codec::parse(&job_type)?,
            priority: row.try_get("priority")?,
            payload: codec::json(&payload)?,
            scheduled_at: codec::timestamp(&scheduled_at)?,
            attempts: row.try_get("attempts")?,
            max_attempts: row.try_get("max_attempts")?,
            status: codec::parse(&status)?,
            error: row.try_get("error")?,
            created_at: codec::timestamp(&created_at)?,
            completed_at: codec::maybe_timestamp(completed_at)?,
        }))
    }
}

/// `SQLite`-backed queue job table. Survives restarts, so continuations
/// parked by long delays are restored on startup.
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    /// Create a new store backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl JobStore for SqliteJobStore {
    async fn save(&self, job: &QueueJob) -> Result<(), ConvoFlowError> {
        let payload = serde_json::to_string(&job.payload).map_err(StorageError::from)?;

        sqlx::query(
            "INSERT INTO queue_jobs (id, owner_id, job_type, priority, payload, scheduled_at, attempts, max_attempts, status, error, created_at, completed_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (id) DO UPDATE SET \
                priority = excluded.priority, \
                payload = excluded.payload, \
                scheduled_at = excluded.scheduled_at, \
                attempts = excluded.attempts, \
                max_attempts = excluded.max_attempts, \
                status = excluded.status, \
                error = excluded.error, \
                completed_at = excluded.completed_at",
        )
        .bind(job.id.to_string())
        .bind(job.owner_id.to_string())
        .bind(job.job_type.as_str())
        .bind(job.priority)
        .bind(&payload)
        .bind(job.scheduled_at.to_rfc3339())
        .bind(job.attempts)
        .bind(job.max_attempts)
        .bind(job.status.as_str())
        .bind(&job.error)
        .bind(job.created_at.to_rfc3339())
        .bind(job.completed_at.map(|ts| ts.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<QueueJob>, ConvoFlowError> {
        let row: Option<Wrapper> = sqlx::query_as("SELECT * FROM queue_jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(row.map(|w| w.0))
    }

    async fn list_unfinished(&self) -> Result<Vec<QueueJob>, ConvoFlowError> {
        let rows: Vec<Wrapper> = sqlx::query_as(
            "SELECT * FROM queue_jobs WHERE status IN ('pending', 'processing') ORDER BY scheduled_at, created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::memory;
    use convoflow_domain::id::OwnerId;
    use convoflow_domain::job::{JobStatus, JobType, RetryPolicy};
    use convoflow_domain::time::now;
    use serde_json::json;

    async fn setup() -> SqliteJobStore {
        memory().await.jobs()
    }

    fn job() -> QueueJob {
        QueueJob::new(
            OwnerId::new(),
            JobType::AutomationAction,
            json!({"action_id": "3"}),
            now(),
        )
        .with_priority(5)
    }

    #[tokio::test]
    async fn should_store_and_reload_job() {
        let store = setup().await;
        let job = job();

        store.save(&job).await.unwrap();
        let fetched = store.get(job.id).await.unwrap().unwrap();

        assert_eq!(fetched.job_type, JobType::AutomationAction);
        assert_eq!(fetched.priority, 5);
        assert_eq!(fetched.payload, job.payload);
        assert_eq!(fetched.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn should_overwrite_state_when_saved_again() {
        let store = setup().await;
        let mut job = job();
        store.save(&job).await.unwrap();

        job.mark_processing().unwrap();
        job.record_failure("timeout", &RetryPolicy::default(), now())
            .unwrap();
        store.save(&job).await.unwrap();

        let fetched = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(fetched.attempts, 1);
        assert_eq!(fetched.error.as_deref(), Some("timeout"));
        assert_eq!(fetched.scheduled_at.timestamp(), job.scheduled_at.timestamp());
    }

    #[tokio::test]
    async fn should_list_only_unfinished_jobs() {
        let store = setup().await;
        let pending = job();
        store.save(&pending).await.unwrap();
        let mut running = job();
        running.mark_processing().unwrap();
        store.save(&running).await.unwrap();
        let mut done = job();
        done.mark_processing().unwrap();
        done.mark_completed(now()).unwrap();
        store.save(&done).await.unwrap();

        let unfinished = store.list_unfinished().await.unwrap();
        let mut ids: Vec<JobId> = unfinished.iter().map(|j| j.id).collect();
        ids.sort_by_key(ToString::to_string);
        let mut expected = vec![pending.id, running.id];
        expected.sort_by_key(ToString::to_string);
        assert_eq!(ids, expected);
    }
}
