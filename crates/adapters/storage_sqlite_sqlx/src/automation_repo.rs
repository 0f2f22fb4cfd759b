//! `SQLite` implementation of [`AutomationRepository`].

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use convoflow_app::ports::AutomationRepository;
use convoflow_domain::automation::{Automation, AutomationAction, Trigger, TriggerType};
use convoflow_domain::error::{ConvoFlowError, NotFoundError};
use convoflow_domain::id::AutomationId;

use crate::error::StorageError;
use crate::codec;

struct Wrapper(Automation);

impl Wrapper {
    fn maybe(value: Option<Self>) -> Option<Automation> {
        value.map(|w| w.0)
    }
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let owner_id: String = row.try_get("owner_id")?;
        let trigger_json: String = row.try_get("trigger_data")?;
        let actions_json: String = row.try_get("actions")?;
        let last_triggered: Option<String> = row.try_get("last_triggered")?;

        let trigger: Trigger = codec::json(&trigger_json)?;
        let actions: Vec<AutomationAction> = codec::json(&actions_json)?;

        Ok(Self(Automation {
            id: codec::parse(&id)?,
            owner_id: codec::parse(&owner_id)?,
            name: row.try_get("name")?,
            active: row.try_get("active")?,
            trigger,
            actions,
            last_triggered: codec::maybe_timestamp(last_triggered)?,
        }))
    }
}

struct Columns {
    trigger_type: &'static str,
    trigger: String,
    actions: String,
    last_triggered: Option<String>,
}

impl Columns {
    fn encode(automation: &Automation) -> Result<Self, StorageError> {
        Ok(Self {
            trigger_type: automation.trigger_type().as_str(),
            trigger: serde_json::to_string(&automation.trigger)?,
            actions: serde_json::to_string(&automation.actions)?,
            last_triggered: automation.last_triggered.map(|ts| ts.to_rfc3339()),
        })
    }
}

/// `SQLite`-backed automation repository.
pub struct SqliteAutomationRepository {
    pool: SqlitePool,
}

impl SqliteAutomationRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl AutomationRepository for SqliteAutomationRepository {
    async fn create(&self, automation: Automation) -> Result<Automation, ConvoFlowError> {
        let columns = Columns::encode(&automation)?;

        sqlx::query(
            "INSERT INTO automations (id, owner_id, name, active, trigger_type, trigger_data, actions, last_triggered) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(automation.id.to_string())
        .bind(automation.owner_id.to_string())
        .bind(&automation.name)
        .bind(automation.active)
        .bind(columns.trigger_type)
        .bind(&columns.trigger)
        .bind(&columns.actions)
        .bind(&columns.last_triggered)
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;

        Ok(automation)
    }

    async fn get_by_id(&self, id: AutomationId) -> Result<Option<Automation>, ConvoFlowError> {
        let row: Option<Wrapper> = sqlx::query_as("SELECT * FROM automations WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(Wrapper::maybe(row))
    }

    async fn get_all(&self) -> Result<Vec<Automation>, ConvoFlowError> {
        let rows: Vec<Wrapper> = sqlx::query_as("SELECT * FROM automations ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }

    async fn find_active_by_trigger_type(
        &self,
        trigger_type: TriggerType,
    ) -> Result<Vec<Automation>, ConvoFlowError> {
        let rows: Vec<Wrapper> = sqlx::query_as(
            "SELECT * FROM automations WHERE active = 1 AND trigger_type = ? ORDER BY name",
        )
        .bind(trigger_type.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }

    async fn update(&self, automation: Automation) -> Result<Automation, ConvoFlowError> {
        let columns = Columns::encode(&automation)?;

        let result = sqlx::query(
            "UPDATE automations SET owner_id = ?, name = ?, active = ?, trigger_type = ?, trigger_data = ?, actions = ?, last_triggered = ? WHERE id = ?",
        )
        .bind(automation.owner_id.to_string())
        .bind(&automation.name)
        .bind(automation.active)
        .bind(columns.trigger_type)
        .bind(&columns.trigger)
        .bind(&columns.actions)
        .bind(&columns.last_triggered)
        .bind(automation.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;

        if result.rows_affected() == 0 {
            return Err(NotFoundError {
                entity: "Automation",
                id: automation.id.to_string(),
            }
            .into());
        }
        Ok(automation)
    }

    async fn delete(&self, id: AutomationId) -> Result<(), ConvoFlowError> {
        sqlx::query("DELETE FROM automations WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }
}
