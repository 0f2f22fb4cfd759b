//! `SQLite` implementation of [`AnalyticsSink`].

use sqlx::{Row, SqlitePool};

use convoflow_app::ports::{AnalyticsEvent, AnalyticsSink};
use convoflow_domain::error::ConvoFlowError;
use convoflow_domain::id::OwnerId;
use convoflow_domain::time::now;

use crate::error::StorageError;

/// Appends analytics records to the `analytics_events` table.
pub struct SqliteAnalyticsSink {
    pool: SqlitePool,
}

impl SqliteAnalyticsSink {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Number of records of `event` for `owner_id`.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the query fails.
    pub async fn count(&self, owner_id: OwnerId, event: AnalyticsEvent) -> Result<i64, ConvoFlowError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM analytics_events WHERE owner_id = ? AND event = ?")
            .bind(owner_id.to_string())
            .bind(event.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(row.try_get("total").map_err(StorageError::from)?)
    }
}

impl AnalyticsSink for SqliteAnalyticsSink {
    async fn record(
        &self,
        owner_id: OwnerId,
        event: AnalyticsEvent,
        metadata: serde_json::Value,
    ) -> Result<(), ConvoFlowError> {
        let metadata = serde_json::to_string(&metadata).map_err(StorageError::from)?;
        sqlx::query(
            "INSERT INTO analytics_events (owner_id, event, metadata, recorded_at) VALUES (?, ?, ?, ?)",
        )
        .bind(owner_id.to_string())
        .bind(event.as_str())
        .bind(&metadata)
        .bind(now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(())
    }
}
