//! Postgres-backed store: JSONB documents with LISTEN/NOTIFY change feeds.
//!
//! A row trigger on `documents` sends `pg_notify('document_changes', …)` with
//! just the collection, id and operation. Subscribers filter by collection and
//! fetch the current body from the table.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use eventcast_common::Collection;
use serde::Deserialize;
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tracing::{debug, warn};

use crate::traits::{ChangeStream, DocumentStore};
use crate::types::{ChangeEvent, ChangeType, Document};

/// NOTIFY channel used by the documents trigger.
pub const CHANGE_CHANNEL: &str = "document_changes";

const LISTENER_RETRY_DELAY: Duration = Duration::from_secs(1);

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    collection  TEXT         NOT NULL,
    id          TEXT         NOT NULL,
    data        JSONB        NOT NULL,
    updated_at  TIMESTAMPTZ  NOT NULL DEFAULT now(),
    PRIMARY KEY (collection, id)
);

CREATE OR REPLACE FUNCTION notify_document_change() RETURNS trigger AS $$
BEGIN
    IF TG_OP = 'DELETE' THEN
        PERFORM pg_notify('document_changes',
            json_build_object('collection', OLD.collection, 'id', OLD.id, 'op', TG_OP)::text);
        RETURN OLD;
    END IF;
    PERFORM pg_notify('document_changes',
        json_build_object('collection', NEW.collection, 'id', NEW.id, 'op', TG_OP)::text);
    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

DROP TRIGGER IF EXISTS documents_notify ON documents;
CREATE TRIGGER documents_notify
    AFTER INSERT OR UPDATE OR DELETE ON documents
    FOR EACH ROW EXECUTE FUNCTION notify_document_change();
"#;

/// Payload carried by each NOTIFY.
#[derive(Debug, Deserialize)]
struct ChangeNotice {
    collection: String,
    id: String,
    op: String,
}

#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Create the documents table and change trigger (idempotent).
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn subscribe(&self, collection: Collection) -> Result<ChangeStream> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(CHANGE_CHANNEL).await?;

        let store = self.clone();
        let stream = async_stream::stream! {
            loop {
                let notification = match listener.recv().await {
                    Ok(n) => n,
                    Err(e) => {
                        warn!(error = %e, %collection, "Change listener failed, retrying");
                        tokio::time::sleep(LISTENER_RETRY_DELAY).await;
                        continue;
                    }
                };

                let notice: ChangeNotice = match serde_json::from_str(notification.payload()) {
                    Ok(n) => n,
                    Err(e) => {
                        warn!(error = %e, payload = notification.payload(), "Malformed change notice");
                        continue;
                    }
                };
                if notice.collection.parse::<Collection>().ok() != Some(collection) {
                    continue;
                }
                let Some(change) = ChangeType::from_tg_op(&notice.op) else {
                    warn!(op = notice.op.as_str(), "Unknown change operation");
                    continue;
                };

                let data = match change {
                    ChangeType::Removed => serde_json::Value::Null,
                    ChangeType::Added | ChangeType::Modified => {
                        match store.get_by_id(collection, &notice.id).await {
                            Ok(Some(doc)) => doc.data,
                            Ok(None) => {
                                debug!(%collection, id = notice.id.as_str(), "Document gone before it was read");
                                continue;
                            }
                            Err(e) => {
                                warn!(error = %e, %collection, id = notice.id.as_str(), "Failed to read changed document");
                                continue;
                            }
                        }
                    }
                };

                yield ChangeEvent {
                    change,
                    document: Document::new(notice.id, data),
                };
            }
        };
        Ok(Box::pin(stream))
    }

    async fn get_by_id(&self, collection: Collection, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query_as::<_, (String, serde_json::Value)>(
            r#"
            SELECT id, data
            FROM documents
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, data)| Document::new(id, data)))
    }

    async fn get_all(&self, collection: Collection) -> Result<Vec<Document>> {
        let rows = sqlx::query_as::<_, (String, serde_json::Value)>(
            r#"
            SELECT id, data
            FROM documents
            WHERE collection = $1
            ORDER BY id ASC
            "#,
        )
        .bind(collection.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, data)| Document::new(id, data))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Test utilities
// ---------------------------------------------------------------------------

#[cfg(feature = "test-utils")]
impl PgDocumentStore {
    /// Insert or replace a document (for tests). Fires the change trigger.
    pub async fn put(&self, collection: Collection, id: &str, data: serde_json::Value) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, data)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, id) DO UPDATE SET data = EXCLUDED.data, updated_at = now()
            "#,
        )
        .bind(collection.as_str())
        .bind(id)
        .bind(&data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete a document (for tests). Fires the change trigger.
    pub async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
