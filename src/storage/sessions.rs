use anyhow::Result;

use super::schema::Database;

impl Database {
    // ========================================================================
    // Session Value Operations
    // ========================================================================

    /// All key-value rows stored for a browsing session, ordered by key.
    pub async fn session_values(&self, session_id: &str) -> Result<Vec<(String, String)>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT key, value FROM session_values WHERE session_id = ? ORDER BY key",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Set a value for a session (UPSERT), stamping it with the current time.
    pub async fn put_session_value(&self, session_id: &str, key: &str, value: &str) -> Result<()> {
        self.put_session_value_at(session_id, key, value, chrono::Utc::now().timestamp())
            .await
    }

    pub(crate) async fn put_session_value_at(
        &self,
        session_id: &str,
        key: &str,
        value: &str,
        updated_at: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO session_values (session_id, key, value, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(session_id, key) DO UPDATE
                SET value = excluded.value, updated_at = excluded.updated_at
        "#,
        )
        .bind(session_id)
        .bind(key)
        .bind(value)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete every session whose newest row is older than `cutoff` (unix
    /// seconds). Returns the number of rows removed.
    pub async fn purge_sessions_before(&self, cutoff: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM session_values WHERE session_id IN (
                SELECT session_id FROM session_values
                GROUP BY session_id
                HAVING MAX(updated_at) < ?
            )
        "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// The most recently written session touched at or after `cutoff`.
    pub async fn latest_session_since(&self, cutoff: i64) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT session_id FROM session_values
            GROUP BY session_id
            HAVING MAX(updated_at) >= ?
            ORDER BY MAX(updated_at) DESC
            LIMIT 1
        "#,
        )
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id,)| id))
    }
}
