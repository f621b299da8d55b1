//! Push-based snapshot streams.
//!
//! A [`FeedSource`] turns a [`FeedQuery`] into a [`Subscription`]: an ordered
//! channel of full-window snapshots that ends after at most one terminal
//! failure. Two sources ship with the crate: [`ChannelSource`] for in-process
//! publishing and [`HttpPollingSource`] which polls a JSON endpoint.

use super::types::{ContentItem, FeedQuery};
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

const MAX_RETRIES: u32 = 3;
const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024; // 10MB
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const SUBSCRIPTION_BUFFER: usize = 8;

/// Errors that end a subscription.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the 30-second timeout
    #[error("Request timed out")]
    Timeout,
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Body was not a valid feed window
    #[error("Malformed feed window: {0}")]
    Decode(String),
    /// The publishing side went away without an explicit failure
    #[error("Source closed")]
    Closed,
}

/// One event delivered by a subscription.
#[derive(Debug)]
pub enum SourceEvent {
    /// Full replacement of the window, newest first.
    Snapshot(Vec<ContentItem>),
    /// Terminal failure. Nothing follows it.
    Failed(SourceError),
}

/// Receiving half of a subscription.
///
/// Dropping it tells the producer to stop; any producer task is aborted.
pub struct Subscription {
    rx: mpsc::Receiver<SourceEvent>,
    producer: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(rx: mpsc::Receiver<SourceEvent>, producer: Option<JoinHandle<()>>) -> Self {
        Self { rx, producer }
    }

    pub async fn next(&mut self) -> Option<SourceEvent> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(handle) = self.producer.take() {
            handle.abort();
            tracing::debug!("Aborted feed source producer on unsubscribe");
        }
    }
}

/// An ordered, bounded-window content stream.
pub trait FeedSource: Send + Sync {
    fn subscribe(&self, query: &FeedQuery) -> Subscription;
}

// ============================================================================
// Channel Source
// ============================================================================

/// Source fed by a [`SnapshotPublisher`].
///
/// Only one subscription is live at a time; subscribing again replaces the
/// previous subscriber, mirroring a remount.
pub struct ChannelSource {
    slot: std::sync::Arc<std::sync::Mutex<Option<mpsc::Sender<SourceEvent>>>>,
}

/// Publishing handle paired with a [`ChannelSource`].
#[derive(Clone)]
pub struct SnapshotPublisher {
    slot: std::sync::Arc<std::sync::Mutex<Option<mpsc::Sender<SourceEvent>>>>,
}

impl ChannelSource {
    pub fn new() -> (Self, SnapshotPublisher) {
        let slot = std::sync::Arc::new(std::sync::Mutex::new(None));
        (
            Self {
                slot: std::sync::Arc::clone(&slot),
            },
            SnapshotPublisher { slot },
        )
    }
}

impl FeedSource for ChannelSource {
    fn subscribe(&self, query: &FeedQuery) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(tx);
        }
        tracing::debug!(kind = %query.kind, limit = query.limit, "Channel source subscribed");
        Subscription::new(rx, None)
    }
}

impl SnapshotPublisher {
    fn sender(&self) -> Option<mpsc::Sender<SourceEvent>> {
        self.slot.lock().ok().and_then(|s| s.clone())
    }

    /// Push a full window. Returns false if nobody is subscribed.
    pub async fn publish(&self, items: Vec<ContentItem>) -> bool {
        match self.sender() {
            Some(tx) => tx.send(SourceEvent::Snapshot(items)).await.is_ok(),
            None => false,
        }
    }

    /// Deliver a terminal failure and detach the subscriber.
    pub async fn fail(&self, error: SourceError) -> bool {
        let tx = self.slot.lock().ok().and_then(|mut s| s.take());
        match tx {
            Some(tx) => tx.send(SourceEvent::Failed(error)).await.is_ok(),
            None => false,
        }
    }
}

// ============================================================================
// HTTP Polling Source
// ============================================================================

#[derive(serde::Deserialize)]
struct WindowBody {
    items: Vec<ContentItem>,
}

/// Polls `GET {base}/feed?kind=..&limit=..` and pushes each changed window.
#[derive(Clone)]
pub struct HttpPollingSource {
    client: reqwest::Client,
    base: Url,
    token: Option<SecretString>,
    interval: Duration,
}

impl HttpPollingSource {
    pub fn new(
        client: reqwest::Client,
        base: Url,
        token: Option<SecretString>,
        interval: Duration,
    ) -> Self {
        Self {
            client,
            base,
            token,
            interval: interval.max(Duration::from_millis(100)),
        }
    }

    fn window_url(&self, query: &FeedQuery) -> Result<Url, SourceError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| SourceError::Decode("base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .push("feed");
        url.query_pairs_mut()
            .append_pair("kind", query.kind.as_str())
            .append_pair("limit", &query.limit.to_string());
        Ok(url)
    }

    async fn poll_loop(self, query: FeedQuery, tx: mpsc::Sender<SourceEvent>) {
        let url = match self.window_url(&query) {
            Ok(url) => url,
            Err(e) => {
                let _ = tx.send(SourceEvent::Failed(e)).await;
                return;
            }
        };

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last: Option<Vec<ContentItem>> = None;

        loop {
            interval.tick().await;
            match self.fetch_window(&url).await {
                Ok(items) => {
                    if last.as_ref() == Some(&items) {
                        tracing::trace!("Feed window unchanged");
                        continue;
                    }
                    last = Some(items.clone());
                    if tx.send(SourceEvent::Snapshot(items)).await.is_err() {
                        tracing::debug!("Subscriber dropped, stopping poll loop");
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Feed subscription failed");
                    let _ = tx.send(SourceEvent::Failed(e)).await;
                    return;
                }
            }
        }
    }

    async fn fetch_window(&self, url: &Url) -> Result<Vec<ContentItem>, SourceError> {
        let mut retry_count = 0;

        let bytes = loop {
            let mut request = self.client.get(url.clone());
            if let Some(token) = &self.token {
                request = request.bearer_auth(token.expose_secret());
            }

            let response = tokio::time::timeout(REQUEST_TIMEOUT, request.send())
                .await
                .map_err(|_| SourceError::Timeout)?
                .map_err(SourceError::Network)?;

            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                if retry_count >= MAX_RETRIES {
                    return Err(SourceError::RateLimited(MAX_RETRIES));
                }
                let delay_secs = 2u64.pow(retry_count + 1); // 2s, 4s, 8s
                tracing::warn!(
                    url = %url,
                    retry = retry_count,
                    delay_secs = delay_secs,
                    "Rate limited, backing off"
                );
                tokio::time::sleep(Duration::from_secs(delay_secs)).await;
                retry_count += 1;
                continue;
            }

            if response.status().is_server_error() {
                if retry_count >= MAX_RETRIES {
                    return Err(SourceError::HttpStatus(response.status().as_u16()));
                }
                let delay_secs = 2u64.pow(retry_count + 1);
                tracing::warn!(
                    url = %url,
                    status = %response.status(),
                    retry = retry_count,
                    delay_secs = delay_secs,
                    "Server error, retrying after delay"
                );
                tokio::time::sleep(Duration::from_secs(delay_secs)).await;
                retry_count += 1;
                continue;
            }

            if !response.status().is_success() {
                return Err(SourceError::HttpStatus(response.status().as_u16()));
            }

            break read_limited_bytes(response, MAX_RESPONSE_SIZE).await?;
        };

        let body: WindowBody =
            serde_json::from_slice(&bytes).map_err(|e| SourceError::Decode(e.to_string()))?;
        Ok(body.items)
    }
}

impl FeedSource for HttpPollingSource {
    fn subscribe(&self, query: &FeedQuery) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let source = self.clone();
        let query = query.clone();
        tracing::info!(base = %self.base, kind = %query.kind, "Subscribing to feed window");
        let handle = tokio::spawn(source.poll_loop(query, tx));
        Subscription::new(rx, Some(handle))
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, SourceError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(SourceError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(SourceError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(SourceError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
