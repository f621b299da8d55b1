//! Author privacy lookups and the per-session cache in front of them.
//!
//! Entries are write-once: an author resolved to `Public` or `Private` is
//! never looked up again for the life of the cache. Failed lookups leave the
//! author `Unknown`, which reads as public (fail-open) and is retried the
//! next time the author shows up in a snapshot.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Upper bound on a single author record body.
const MAX_RECORD_SIZE: usize = 64 * 1024;

// ============================================================================
// Types
// ============================================================================

/// Tri-state privacy flag. `Unknown` is never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Unknown,
    Public,
    Private,
}

/// Result of a point lookup against the author directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
pub struct AuthorRecord {
    #[serde(default = "default_exists")]
    pub exists: bool,
    #[serde(rename = "isPrivate", default)]
    pub is_private: bool,
}

fn default_exists() -> bool {
    true
}

impl AuthorRecord {
    pub fn missing() -> Self {
        Self {
            exists: false,
            is_private: false,
        }
    }

    /// A missing record is treated exactly like a public one.
    pub fn visibility(&self) -> Visibility {
        if self.exists && self.is_private {
            Visibility::Private
        } else {
            Visibility::Public
        }
    }
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Lookup timed out")]
    Timeout,
    #[error("Malformed author record: {0}")]
    Decode(String),
}

/// Point lookup of an author's privacy flag.
#[async_trait]
pub trait AuthorDirectory: Send + Sync {
    async fn lookup(&self, author_id: &str) -> Result<AuthorRecord, LookupError>;
}

// ============================================================================
// HTTP Directory
// ============================================================================

/// Author directory served at `GET {base}/authors/{id}`.
pub struct HttpAuthorDirectory {
    client: reqwest::Client,
    base: Url,
    token: Option<secrecy::SecretString>,
    timeout: Duration,
}

impl HttpAuthorDirectory {
    pub fn new(client: reqwest::Client, base: Url, token: Option<secrecy::SecretString>) -> Self {
        Self {
            client,
            base,
            token,
            timeout: Duration::from_secs(10),
        }
    }

    fn record_url(&self, author_id: &str) -> Result<Url, LookupError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| LookupError::Decode("base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(["authors", author_id]);
        Ok(url)
    }
}

#[async_trait]
impl AuthorDirectory for HttpAuthorDirectory {
    async fn lookup(&self, author_id: &str) -> Result<AuthorRecord, LookupError> {
        use secrecy::ExposeSecret;

        let url = self.record_url(author_id)?;
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| LookupError::Timeout)??;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(AuthorRecord::missing());
        }
        if !response.status().is_success() {
            return Err(LookupError::HttpStatus(response.status().as_u16()));
        }

        let body = tokio::time::timeout(self.timeout, response.bytes())
            .await
            .map_err(|_| LookupError::Timeout)??;
        if body.len() > MAX_RECORD_SIZE {
            return Err(LookupError::Decode("record too large".to_string()));
        }

        serde_json::from_slice(&body).map_err(|e| LookupError::Decode(e.to_string()))
    }
}

// ============================================================================
// Cache
// ============================================================================

/// Outcome of one lookup, carried back to the engine loop.
pub type LookupOutcome = (String, Result<AuthorRecord, LookupError>);

/// Memoized author privacy flags for one feed session.
///
/// Resolution is split in two so that the network half can run off the
/// engine loop: [`begin_resolve`](Self::begin_resolve) marks authors as in
/// flight and returns the lookup future, [`apply`](Self::apply) writes the
/// outcomes once they are back.
pub struct VisibilityCache {
    directory: Arc<dyn AuthorDirectory>,
    entries: HashMap<String, Visibility>,
    in_flight: HashSet<String>,
    concurrency: usize,
    lookups_issued: Arc<AtomicU64>,
}

impl VisibilityCache {
    pub fn new(directory: Arc<dyn AuthorDirectory>, concurrency: usize) -> Self {
        Self {
            directory,
            entries: HashMap::new(),
            in_flight: HashSet::new(),
            concurrency: concurrency.max(1),
            lookups_issued: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn get(&self, author_id: &str) -> Visibility {
        self.entries
            .get(author_id)
            .copied()
            .unwrap_or(Visibility::Unknown)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of directory lookups started by this cache.
    pub fn lookups_issued(&self) -> u64 {
        self.lookups_issued.load(Ordering::Relaxed)
    }

    /// Seed a resolved entry. Existing entries are never overwritten.
    pub fn record(&mut self, author_id: &str, visibility: Visibility) {
        if visibility == Visibility::Unknown {
            return;
        }
        self.entries
            .entry(author_id.to_string())
            .or_insert(visibility);
    }

    /// Authors from `ids` that are neither resolved nor already being looked up.
    pub fn unknown_among<'a, I>(&self, ids: I) -> HashSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        ids.into_iter()
            .filter(|id| !self.entries.contains_key(*id) && !self.in_flight.contains(*id))
            .map(str::to_string)
            .collect()
    }

    /// Start one concurrent lookup per author.
    ///
    /// Callers pass only ids from [`unknown_among`](Self::unknown_among); ids
    /// that are already known or in flight are skipped defensively so a
    /// lookup is never duplicated.
    pub fn begin_resolve(
        &mut self,
        ids: HashSet<String>,
    ) -> impl Future<Output = Vec<LookupOutcome>> + Send + 'static {
        let pending: Vec<String> = ids
            .into_iter()
            .filter(|id| !self.entries.contains_key(id) && self.in_flight.insert(id.clone()))
            .collect();

        self.lookups_issued
            .fetch_add(pending.len() as u64, Ordering::Relaxed);
        tracing::debug!(authors = pending.len(), "Resolving author visibility");

        let directory = Arc::clone(&self.directory);
        let concurrency = self.concurrency;

        async move {
            stream::iter(pending)
                .map(|id| {
                    let directory = Arc::clone(&directory);
                    async move {
                        let result = directory.lookup(&id).await;
                        (id, result)
                    }
                })
                .buffer_unordered(concurrency)
                .collect()
                .await
        }
    }

    /// Write lookup outcomes. Failures leave the author unknown.
    ///
    /// Returns the number of newly resolved authors.
    pub fn apply(&mut self, outcomes: Vec<LookupOutcome>) -> usize {
        let mut resolved = 0;
        for (id, result) in outcomes {
            self.in_flight.remove(&id);
            match result {
                Ok(record) => {
                    if !self.entries.contains_key(&id) {
                        self.entries.insert(id, record.visibility());
                        resolved += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(author = %id, error = %e, "Author lookup failed, treating as public");
                }
            }
        }
        resolved
    }

    /// Resolve authors inline. Convenience for callers that can await.
    pub async fn resolve(&mut self, ids: HashSet<String>) -> usize {
        let outcomes = self.begin_resolve(ids).await;
        self.apply(outcomes)
    }

    /// Whether content by `author_id` is hidden from `viewer_id`.
    pub fn is_suppressed(
        &self,
        author_id: &str,
        viewer_id: &str,
        viewer_following: &HashSet<String>,
    ) -> bool {
        self.get(author_id) == Visibility::Private
            && author_id != viewer_id
            && !viewer_following.contains(author_id)
    }

    /// Every known author currently hidden from the viewer.
    pub fn suppressed_set(
        &self,
        viewer_id: &str,
        viewer_following: &HashSet<String>,
    ) -> HashSet<String> {
        self.entries
            .keys()
            .filter(|id| self.is_suppressed(id, viewer_id, viewer_following))
            .cloned()
            .collect()
    }
}

// ============================================================================
// Test Doubles
// ============================================================================

/// In-memory directory with per-author canned answers and a call log.
#[derive(Default)]
pub struct StaticDirectory {
    records: std::sync::Mutex<HashMap<String, Option<AuthorRecord>>>,
    calls: std::sync::Mutex<Vec<String>>,
    delays: std::sync::Mutex<HashMap<String, Duration>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_private(self, author_id: &str) -> Self {
        self.set(author_id, Some(AuthorRecord { exists: true, is_private: true }));
        self
    }

    pub fn with_public(self, author_id: &str) -> Self {
        self.set(author_id, Some(AuthorRecord { exists: true, is_private: false }));
        self
    }

    /// Lookups for this author fail until a record is set.
    pub fn with_failure(self, author_id: &str) -> Self {
        self.set(author_id, None);
        self
    }

    pub fn with_delay(self, author_id: &str, delay: Duration) -> Self {
        if let Ok(mut delays) = self.delays.lock() {
            delays.insert(author_id.to_string(), delay);
        }
        self
    }

    pub fn set(&self, author_id: &str, record: Option<AuthorRecord>) {
        if let Ok(mut records) = self.records.lock() {
            records.insert(author_id.to_string(), record);
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn calls_for(&self, author_id: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == author_id).count()
    }
}

#[async_trait]
impl AuthorDirectory for StaticDirectory {
    async fn lookup(&self, author_id: &str) -> Result<AuthorRecord, LookupError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(author_id.to_string());
        }
        let delay = self
            .delays
            .lock()
            .ok()
            .and_then(|d| d.get(author_id).copied());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let record = self
            .records
            .lock()
            .ok()
            .and_then(|r| r.get(author_id).copied());
        match record {
            Some(Some(record)) => Ok(record),
            Some(None) => Err(LookupError::HttpStatus(503)),
            None => Ok(AuthorRecord::missing()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ids(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_resolve_populates_cache() {
        let dir = Arc::new(StaticDirectory::new().with_private("a").with_public("b"));
        let mut cache = VisibilityCache::new(dir.clone(), 4);

        let resolved = cache.resolve(ids(&["a", "b", "c"])).await;
        assert_eq!(resolved, 3);
        assert_eq!(cache.get("a"), Visibility::Private);
        assert_eq!(cache.get("b"), Visibility::Public);
        // No record at all reads as public
        assert_eq!(cache.get("c"), Visibility::Public);
        assert_eq!(cache.lookups_issued(), 3);
    }

    #[tokio::test]
    async fn test_known_authors_are_never_refetched() {
        let dir = Arc::new(StaticDirectory::new().with_private("a"));
        let mut cache = VisibilityCache::new(dir.clone(), 4);

        cache.resolve(ids(&["a"])).await;
        let unknown = cache.unknown_among(["a", "b"]);
        assert_eq!(unknown, ids(&["b"]));

        // Even if a caller passes a known id, no lookup is issued for it
        cache.resolve(ids(&["a", "b"])).await;
        assert_eq!(dir.calls_for("a"), 1);
        assert_eq!(dir.calls_for("b"), 1);
    }

    #[tokio::test]
    async fn test_failed_lookup_stays_unknown_and_retries() {
        let dir = Arc::new(StaticDirectory::new().with_failure("a"));
        let mut cache = VisibilityCache::new(dir.clone(), 4);

        let resolved = cache.resolve(ids(&["a"])).await;
        assert_eq!(resolved, 0);
        assert_eq!(cache.get("a"), Visibility::Unknown);
        assert!(!cache.is_suppressed("a", "viewer", &HashSet::new()));

        dir.set("a", Some(AuthorRecord { exists: true, is_private: true }));
        assert_eq!(cache.unknown_among(["a"]), ids(&["a"]));
        cache.resolve(ids(&["a"])).await;
        assert_eq!(cache.get("a"), Visibility::Private);
        assert_eq!(dir.calls_for("a"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookups_run_concurrently() {
        let dir = Arc::new(
            StaticDirectory::new()
                .with_private("slow")
                .with_delay("slow", Duration::from_millis(300))
                .with_public("slower")
                .with_delay("slower", Duration::from_millis(500)),
        );
        let mut cache = VisibilityCache::new(dir.clone(), 4);

        let started = tokio::time::Instant::now();
        let resolved = cache.resolve(ids(&["slow", "slower"])).await;
        let elapsed = started.elapsed();

        assert_eq!(resolved, 2);
        assert!(elapsed >= Duration::from_millis(500), "took {elapsed:?}");
        assert!(elapsed < Duration::from_millis(800), "took {elapsed:?}");
        assert_eq!(cache.get("slow"), Visibility::Private);
        assert_eq!(cache.get("slower"), Visibility::Public);
    }

    #[tokio::test]
    async fn test_in_flight_authors_are_not_unknown() {
        let dir = Arc::new(StaticDirectory::new().with_private("a"));
        let mut cache = VisibilityCache::new(dir.clone(), 4);

        let pending = cache.begin_resolve(ids(&["a"]));
        assert!(cache.unknown_among(["a"]).is_empty());
        // A second begin for the same id issues nothing
        let second = cache.begin_resolve(ids(&["a"])).await;
        assert!(second.is_empty());

        let outcomes = pending.await;
        cache.apply(outcomes);
        assert_eq!(cache.get("a"), Visibility::Private);
        assert_eq!(cache.lookups_issued(), 1);
    }

    #[test]
    fn test_suppression_rules() {
        let mut cache = VisibilityCache::new(Arc::new(StaticDirectory::new()), 1);
        cache.record("followed", Visibility::Private);
        cache.record("stranger", Visibility::Private);
        cache.record("me", Visibility::Private);
        cache.record("open", Visibility::Public);

        let following = ids(&["followed"]);
        assert!(!cache.is_suppressed("followed", "me", &following));
        assert!(cache.is_suppressed("stranger", "me", &following));
        assert!(!cache.is_suppressed("me", "me", &following));
        assert!(!cache.is_suppressed("open", "me", &following));
        assert!(!cache.is_suppressed("never-seen", "me", &following));

        assert_eq!(cache.suppressed_set("me", &following), ids(&["stranger"]));
    }

    #[test]
    fn test_record_is_write_once() {
        let mut cache = VisibilityCache::new(Arc::new(StaticDirectory::new()), 1);
        cache.record("a", Visibility::Private);
        cache.record("a", Visibility::Public);
        cache.record("b", Visibility::Unknown);
        assert_eq!(cache.get("a"), Visibility::Private);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_http_directory_private_record() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/authors/alice"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"isPrivate":true}"#))
            .mount(&server)
            .await;

        let base = Url::parse(&format!("{}/api", server.uri())).unwrap();
        let dir = HttpAuthorDirectory::new(reqwest::Client::new(), base, None);
        let record = dir.lookup("alice").await.unwrap();
        assert!(record.exists);
        assert_eq!(record.visibility(), Visibility::Private);
    }

    #[tokio::test]
    async fn test_http_directory_missing_record_is_public() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let base = Url::parse(&server.uri()).unwrap();
        let dir = HttpAuthorDirectory::new(reqwest::Client::new(), base, None);
        let record = dir.lookup("ghost").await.unwrap();
        assert!(!record.exists);
        assert_eq!(record.visibility(), Visibility::Public);
    }

    #[tokio::test]
    async fn test_http_directory_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let base = Url::parse(&server.uri()).unwrap();
        let dir = HttpAuthorDirectory::new(reqwest::Client::new(), base, None);
        match dir.lookup("alice").await {
            Err(LookupError::HttpStatus(500)) => {}
            other => panic!("Expected HttpStatus(500), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_directory_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let base = Url::parse(&server.uri()).unwrap();
        let dir = HttpAuthorDirectory::new(reqwest::Client::new(), base, None);
        assert!(matches!(
            dir.lookup("alice").await,
            Err(LookupError::Decode(_))
        ));
    }
}
