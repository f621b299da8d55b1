//! Resume cache: instant first paint after a remount.
//!
//! A bounded prefix of the raw window plus the cursor is written to a
//! session-scoped key-value store at idle time and read back synchronously
//! when the next session mounts. Everything here is best-effort: a missing,
//! stale or unreadable snapshot only means an empty first paint.

use super::types::{ContentItem, FeedKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Items persisted per snapshot.
pub const DEFAULT_RESUME_ITEMS: usize = 30;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session store write failed: {0}")]
    Database(String),
    #[error("Failed to serialize resume snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Key-value string store scoped to the browsing session.
///
/// `get` is synchronous by contract so a snapshot can be read during
/// construction; writes may be asynchronous.
#[async_trait]
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: String) -> Result<(), StoreError>;
}

/// Process-local store. Also the test double.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut values = self
            .values
            .lock()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        values.insert(key.to_string(), value);
        Ok(())
    }
}

/// Persisted view state.
///
/// `cursor` is stored verbatim; it is only meaningful against the visible
/// list at write time, so consumers clamp it on restore.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResumeSnapshot {
    pub version: u32,
    pub items: Vec<ContentItem>,
    pub cursor: usize,
}

impl ResumeSnapshot {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The stored cursor clamped to a list of `len` items.
    pub fn cursor_within(&self, len: usize) -> Option<usize> {
        if len == 0 {
            None
        } else {
            Some(self.cursor.min(len - 1))
        }
    }
}

pub struct ResumeCache {
    store: Arc<dyn SessionStore>,
    key: String,
    max_items: usize,
    idle: Duration,
    generation: Arc<AtomicU64>,
}

impl ResumeCache {
    pub fn new(store: Arc<dyn SessionStore>, kind: FeedKind, max_items: usize, idle: Duration) -> Self {
        Self {
            store,
            key: format!("resume.{}", kind.as_str()),
            max_items,
            idle,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the last snapshot. Never fails; anything unreadable is empty.
    pub fn load(&self) -> ResumeSnapshot {
        let Some(raw) = self.store.get(&self.key) else {
            return ResumeSnapshot::default();
        };

        match serde_json::from_str::<ResumeSnapshot>(&raw) {
            Ok(snapshot) if snapshot.version == SNAPSHOT_VERSION => {
                tracing::debug!(
                    key = %self.key,
                    items = snapshot.items.len(),
                    cursor = snapshot.cursor,
                    "Restored resume snapshot"
                );
                snapshot
            }
            Ok(snapshot) => {
                tracing::debug!(key = %self.key, version = snapshot.version, "Ignoring resume snapshot from another version");
                ResumeSnapshot::default()
            }
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Discarding unreadable resume snapshot");
                ResumeSnapshot::default()
            }
        }
    }

    fn encode(&self, items: &[ContentItem], cursor: usize) -> Result<String, StoreError> {
        let snapshot = ResumeSnapshot {
            version: SNAPSHOT_VERSION,
            items: items.iter().take(self.max_items).cloned().collect(),
            cursor,
        };
        Ok(serde_json::to_string(&snapshot)?)
    }

    /// Schedule a deferred write. The newest call wins; bursts coalesce.
    pub fn save(&self, items: &[ContentItem], cursor: usize) {
        let value = match self.encode(items, cursor) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Skipping resume snapshot");
                return;
            }
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let latest = Arc::clone(&self.generation);
        let store = Arc::clone(&self.store);
        let key = self.key.clone();
        let idle = self.idle;

        tokio::spawn(async move {
            tokio::time::sleep(idle).await;
            if latest.load(Ordering::SeqCst) != generation {
                tracing::trace!(key = %key, generation, "Resume write superseded");
                return;
            }
            if let Err(e) = store.set(&key, value).await {
                tracing::warn!(key = %key, error = %e, "Resume snapshot write failed");
            }
        });
    }

    /// Write immediately, bypassing the idle delay. Used on unmount.
    pub async fn save_now(&self, items: &[ContentItem], cursor: usize) -> Result<(), StoreError> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let value = self.encode(items, cursor)?;
        self.store.set(&self.key, value).await
    }
}
