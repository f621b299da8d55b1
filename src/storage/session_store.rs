//! [`SessionStore`] backed by the SQLite session table.
//!
//! Rows for the session are loaded once at open into an in-memory mirror,
//! which serves the synchronous `get`. `set` updates the mirror first, then
//! upserts the row.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::schema::Database;
use crate::feed::{SessionStore, StoreError};

/// Sessions untouched for longer than this are purged at open.
pub const SESSION_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

pub struct SqliteSessionStore {
    db: Database,
    session_id: String,
    mirror: Mutex<HashMap<String, String>>,
}

impl SqliteSessionStore {
    /// Attach to `session_id`, preloading its rows.
    pub async fn open(db: Database, session_id: impl Into<String>) -> Result<Self> {
        let session_id = session_id.into();
        let rows = db.session_values(&session_id).await?;
        tracing::debug!(session = %session_id, rows = rows.len(), "Session store loaded");
        Ok(Self {
            db,
            session_id,
            mirror: Mutex::new(rows.into_iter().collect()),
        })
    }

    /// Purge expired sessions, then continue the most recent live one or
    /// start a fresh session.
    pub async fn resume_or_start(db: Database, max_age: Duration) -> Result<Self> {
        let cutoff = chrono::Utc::now().timestamp() - max_age.as_secs() as i64;
        let purged = db.purge_sessions_before(cutoff).await?;
        if purged > 0 {
            tracing::info!(rows = purged, "Purged expired session values");
        }

        let session_id = match db.latest_session_since(cutoff).await? {
            Some(id) => {
                tracing::info!(session = %id, "Resuming browsing session");
                id
            }
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                tracing::info!(session = %id, "Starting browsing session");
                id
            }
        };
        Self::open(db, session_id).await
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.mirror.lock().ok()?.get(key).cloned()
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        {
            let mut mirror = self
                .mirror
                .lock()
                .map_err(|e| StoreError::Database(e.to_string()))?;
            mirror.insert(key.to_string(), value.clone());
        }
        self.db
            .put_session_value(&self.session_id, key, &value)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}
