use anyhow::Result;
use chrono::{DateTime, Utc};

use super::schema::Database;
use super::store::FeedStore;
use super::types::{StoredFeed, StoredFeedRow};
use crate::feed::FeedMetadata;

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

impl FeedStore for Database {
    /// Writes the document, then the metadata, in one transaction.
    async fn put(&self, key: &str, document: &str, metadata: &FeedMetadata) -> Result<()> {
        let updated_at = metadata.updated_at.timestamp_millis();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO feed_documents (key, document, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                document = excluded.document,
                updated_at = excluded.updated_at
        "#,
        )
        .bind(key)
        .bind(document)
        .bind(updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO feed_metadata (key, query, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                query = excluded.query,
                updated_at = excluded.updated_at
        "#,
        )
        .bind(key)
        .bind(&metadata.query)
        .bind(updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::debug!(key = %key, bytes = document.len(), "Stored feed document");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT document FROM feed_documents WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(document,)| document))
    }

    async fn list(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT key FROM feed_documents ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(key,)| key).collect())
    }
}

impl Database {
    // ========================================================================
    // Metadata Operations
    // ========================================================================

    /// Metadata last written for `key`, if any.
    pub async fn feed_metadata(&self, key: &str) -> Result<Option<FeedMetadata>> {
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT query, updated_at FROM feed_metadata WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.and_then(|(query, ms)| {
            from_millis(ms).map(|updated_at| FeedMetadata { query, updated_at })
        }))
    }

    /// Every stored key with its metadata, sorted by key.
    pub async fn list_with_metadata(&self) -> Result<Vec<StoredFeed>> {
        let rows: Vec<StoredFeedRow> = sqlx::query_as(
            r#"
                SELECT d.key, m.query, m.updated_at
                FROM feed_documents d
                LEFT JOIN feed_metadata m ON m.key = d.key
                ORDER BY d.key
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(key, query, updated_at)| StoredFeed {
                key,
                query,
                updated_at: updated_at.and_then(from_millis),
            })
            .collect())
    }
}
