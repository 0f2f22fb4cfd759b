//! `SQLite` implementation of [`ContactStore`], including the outbound
//! message log.

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqliteConnection, SqlitePool};

use convoflow_app::ports::ContactStore;
use convoflow_domain::contact::{Channel, Contact, ContactPatch, OutboundMessage};
use convoflow_domain::error::{ConvoFlowError, NotFoundError};
use convoflow_domain::id::{ContactId, OwnerId};
use convoflow_domain::time::now;

use crate::codec;
use crate::error::StorageError;

struct Wrapper(Contact);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let owner_id: String = row.try_get("owner_id")?;
        let channel: String = row.try_get("channel")?;
        let tags: String = row.try_get("tags")?;
        let custom_fields: String = row.try_get("custom_fields")?;
        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;

        Ok(Self(Contact {
            id: codec::parse(&id)?,
            owner_id: codec::parse(&owner_id)?,
            identifier: row.try_get("identifier")?,
            channel: codec::parse(&channel)?,
            name: row.try_get("name")?,
            phone: row.try_get("phone")?,
            email: row.try_get("email")?,
            tags: codec::json(&tags)?,
            custom_fields: codec::json(&custom_fields)?,
            created_at: codec::timestamp(&created_at)?,
            updated_at: codec::timestamp(&updated_at)?,
        }))
    }
}

/// `SQLite`-backed contact store.
pub struct SqliteContactStore {
    pool: SqlitePool,
}

impl SqliteContactStore {
    /// Create a new store backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Outbound messages sent to `contact_id`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the query fails.
    pub async fn messages(&self, contact_id: ContactId) -> Result<Vec<OutboundMessage>, ConvoFlowError> {
        let rows = sqlx::query(
            "SELECT * FROM contact_messages WHERE contact_id = ? ORDER BY sent_at, id",
        )
        .bind(contact_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from)?;
        rows.iter()
            .map(decode_message)
            .collect::<Result<_, _>>()
            .map_err(|e| StorageError::from(e).into())
    }
}

fn decode_message(row: &SqliteRow) -> Result<OutboundMessage, sqlx::Error> {
    let owner_id: String = row.try_get("owner_id")?;
    let contact_id: String = row.try_get("contact_id")?;
    let automation_id: Option<String> = row.try_get("automation_id")?;
    let channel: String = row.try_get("channel")?;
    let sent_at: String = row.try_get("sent_at")?;
    Ok(OutboundMessage {
        owner_id: codec::parse(&owner_id)?,
        contact_id: codec::parse(&contact_id)?,
        automation_id: automation_id.as_deref().map(codec::parse).transpose()?,
        channel: codec::parse(&channel)?,
        content: row.try_get("content")?,
        media_url: row.try_get("media_url")?,
        external_id: row.try_get("external_id")?,
        sent_at: codec::timestamp(&sent_at)?,
    })
}

async fn fetch(conn: &mut SqliteConnection, id: ContactId) -> Result<Option<Contact>, StorageError> {
    let row: Option<Wrapper> = sqlx::query_as("SELECT * FROM contacts WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(conn)
        .await?;
    Ok(row.map(|w| w.0))
}

impl ContactStore for SqliteContactStore {
    async fn find_or_create(
        &self,
        owner_id: OwnerId,
        identifier: &str,
        channel: Channel,
    ) -> Result<Contact, ConvoFlowError> {
        let candidate = Contact::new(owner_id, identifier, channel, now())?;

        // The unique (owner, identifier, channel) index keeps concurrent
        // first messages from creating two contacts.
        sqlx::query(
            "INSERT INTO contacts (id, owner_id, identifier, channel, name, phone, email, tags, custom_fields, created_at, updated_at) \
             VALUES (?, ?, ?, ?, NULL, ?, NULL, '[]', '{}', ?, ?) \
             ON CONFLICT (owner_id, identifier, channel) DO NOTHING",
        )
        .bind(candidate.id.to_string())
        .bind(owner_id.to_string())
        .bind(&candidate.identifier)
        .bind(channel.as_str())
        .bind(&candidate.phone)
        .bind(candidate.created_at.to_rfc3339())
        .bind(candidate.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;

        let row: Wrapper = sqlx::query_as(
            "SELECT * FROM contacts WHERE owner_id = ? AND identifier = ? AND channel = ?",
        )
        .bind(owner_id.to_string())
        .bind(&candidate.identifier)
        .bind(channel.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(row.0)
    }

    async fn get(&self, id: ContactId) -> Result<Option<Contact>, ConvoFlowError> {
        let mut conn = self.pool.acquire().await.map_err(StorageError::from)?;
        Ok(fetch(&mut conn, id).await?)
    }

    async fn update(&self, id: ContactId, patch: ContactPatch) -> Result<Contact, ConvoFlowError> {
        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;
        let mut contact = fetch(&mut tx, id).await?.ok_or_else(|| NotFoundError {
            entity: "Contact",
            id: id.to_string(),
        })?;
        patch.apply(&mut contact, now());

        let tags = serde_json::to_string(&contact.tags).map_err(StorageError::from)?;
        let fields = serde_json::to_string(&contact.custom_fields).map_err(StorageError::from)?;
        sqlx::query(
            "UPDATE contacts SET name = ?, phone = ?, email = ?, tags = ?, custom_fields = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&contact.name)
        .bind(&contact.phone)
        .bind(&contact.email)
        .bind(&tags)
        .bind(&fields)
        .bind(contact.updated_at.to_rfc3339())
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(StorageError::from)?;
        tx.commit().await.map_err(StorageError::from)?;
        Ok(contact)
    }

    async fn list_by_tags(
        &self,
        owner_id: OwnerId,
        tags: &[String],
    ) -> Result<Vec<Contact>, ConvoFlowError> {
        let rows: Vec<Wrapper> =
            sqlx::query_as("SELECT * FROM contacts WHERE owner_id = ? ORDER BY created_at, id")
                .bind(owner_id.to_string())
                .fetch_all(&self.pool)
                .await
                .map_err(StorageError::from)?;
        Ok(rows
            .into_iter()
            .map(|w| w.0)
            .filter(|c| c.has_all_tags(tags))
            .collect())
    }

    async fn record_message(&self, message: OutboundMessage) -> Result<(), ConvoFlowError> {
        sqlx::query(
            "INSERT INTO contact_messages (owner_id, contact_id, automation_id, channel, content, media_url, external_id, sent_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(message.owner_id.to_string())
        .bind(message.contact_id.to_string())
        .bind(message.automation_id.map(|id| id.to_string()))
        .bind(message.channel.as_str())
        .bind(&message.content)
        .bind(&message.media_url)
        .bind(&message.external_id)
        .bind(message.sent_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(())
    }
}
