//! Feed synchronizer: subscription, raw window, and the privacy post-filter.
//!
//! All state here is mutated from the engine loop only. Background work
//! (subscription forwarding, author lookups) runs in spawned tasks that
//! report back as [`FeedEvent`]s on the engine channel, so a lookup batch
//! that settles late always recomputes against the cache as it is *then*.

use super::source::{FeedSource, SourceError, SourceEvent};
use super::types::{filter_visible, ContentItem, FeedQuery, FeedUpdate, Viewer};
use super::visibility::{LookupOutcome, VisibilityCache};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Events re-entering the engine loop.
#[derive(Debug)]
pub enum FeedEvent {
    /// Forwarded from the data source subscription.
    Source(SourceEvent),
    /// A batch of author lookups finished.
    LookupsSettled(Vec<LookupOutcome>),
}

/// Subscription lifecycle for one mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Subscribing,
    Streaming,
    /// Terminal soft failure; the last window stays on screen.
    Failed(String),
    Closed,
}

/// Guard returned by [`FeedSynchronizer::start`].
///
/// Dropping it stops forwarding source events into the engine.
pub struct Unsubscribe {
    forwarder: Option<JoinHandle<()>>,
}

impl Unsubscribe {
    pub fn unsubscribe(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(handle) = self.forwarder.take() {
            handle.abort();
            tracing::debug!("Feed subscription forwarder stopped");
        }
    }
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        self.stop();
    }
}

pub struct FeedSynchronizer {
    query: FeedQuery,
    viewer: Viewer,
    visibility: VisibilityCache,
    items: Arc<Vec<ContentItem>>,
    suppressed: Arc<HashSet<String>>,
    state: SyncState,
    events: mpsc::Sender<FeedEvent>,
}

impl FeedSynchronizer {
    pub fn new(
        query: FeedQuery,
        viewer: Viewer,
        visibility: VisibilityCache,
        events: mpsc::Sender<FeedEvent>,
    ) -> Self {
        Self {
            query,
            viewer,
            visibility,
            items: Arc::new(Vec::new()),
            suppressed: Arc::new(HashSet::new()),
            state: SyncState::Subscribing,
            events,
        }
    }

    /// Subscribe to `source` and forward its events into the engine channel.
    pub fn start(&mut self, source: &dyn FeedSource) -> Unsubscribe {
        let mut subscription = source.subscribe(&self.query);
        let tx = self.events.clone();
        self.state = SyncState::Subscribing;

        let forwarder = tokio::spawn(async move {
            loop {
                let event = subscription
                    .next()
                    .await
                    .unwrap_or(SourceEvent::Failed(SourceError::Closed));
                let terminal = matches!(event, SourceEvent::Failed(_));
                if tx.send(FeedEvent::Source(event)).await.is_err() {
                    tracing::debug!("Engine channel closed, dropping source event");
                    break;
                }
                if terminal {
                    break;
                }
            }
        });

        Unsubscribe {
            forwarder: Some(forwarder),
        }
    }

    /// Apply one engine event. Returns the `onUpdate` emission, if any.
    pub fn handle(&mut self, event: FeedEvent) -> Option<FeedUpdate> {
        match event {
            FeedEvent::Source(SourceEvent::Snapshot(items)) => self.on_snapshot(items),
            FeedEvent::Source(SourceEvent::Failed(error)) => {
                self.on_failure(error);
                None
            }
            FeedEvent::LookupsSettled(outcomes) => self.on_lookups_settled(outcomes),
        }
    }

    fn on_snapshot(&mut self, mut items: Vec<ContentItem>) -> Option<FeedUpdate> {
        if matches!(self.state, SyncState::Failed(_) | SyncState::Closed) {
            tracing::debug!(state = ?self.state, "Ignoring snapshot after subscription ended");
            return None;
        }

        if items.len() > self.query.limit {
            tracing::warn!(
                received = items.len(),
                limit = self.query.limit,
                "Snapshot exceeds page size, truncating"
            );
            items.truncate(self.query.limit);
        }

        self.items = Arc::new(items);
        self.state = SyncState::Streaming;

        let unknown = self
            .visibility
            .unknown_among(self.items.iter().map(|i| i.author_id.as_str()));
        if !unknown.is_empty() {
            self.spawn_lookups(unknown);
        }

        self.recompute_suppressed();
        tracing::debug!(
            items = self.items.len(),
            suppressed = self.suppressed.len(),
            "Feed window replaced"
        );
        Some(self.current())
    }

    fn on_lookups_settled(&mut self, outcomes: Vec<LookupOutcome>) -> Option<FeedUpdate> {
        let resolved = self.visibility.apply(outcomes);
        if self.state == SyncState::Closed {
            return None;
        }
        self.recompute_suppressed();
        tracing::debug!(
            resolved = resolved,
            suppressed = self.suppressed.len(),
            "Author lookups settled"
        );
        Some(self.current())
    }

    fn on_failure(&mut self, error: SourceError) {
        if matches!(self.state, SyncState::Failed(_) | SyncState::Closed) {
            return;
        }
        tracing::warn!(
            error = %error,
            items = self.items.len(),
            "Feed subscription failed, keeping last window"
        );
        self.state = SyncState::Failed(error.to_string());
    }

    fn spawn_lookups(&mut self, authors: HashSet<String>) {
        let lookups = self.visibility.begin_resolve(authors);
        let tx = self.events.clone();
        tokio::spawn(async move {
            let outcomes = lookups.await;
            if tx.send(FeedEvent::LookupsSettled(outcomes)).await.is_err() {
                tracing::debug!("Engine gone before author lookups settled");
            }
        });
    }

    /// Rebuild the suppressed set from the full cache, never from a copy.
    fn recompute_suppressed(&mut self) {
        self.suppressed = Arc::new(
            self.visibility
                .suppressed_set(&self.viewer.id, &self.viewer.following),
        );
    }

    /// Mark the mount as torn down. Later events are ignored.
    pub fn close(&mut self) {
        self.state = SyncState::Closed;
    }

    pub fn current(&self) -> FeedUpdate {
        FeedUpdate {
            items: Arc::clone(&self.items),
            suppressed: Arc::clone(&self.suppressed),
        }
    }

    pub fn visible(&self) -> Vec<ContentItem> {
        filter_visible(&self.items, &self.suppressed)
    }

    pub fn items(&self) -> &[ContentItem] {
        &self.items
    }

    pub fn suppressed(&self) -> &HashSet<String> {
        &self.suppressed
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state == SyncState::Subscribing
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    pub fn visibility(&self) -> &VisibilityCache {
        &self.visibility
    }

    pub fn query(&self) -> &FeedQuery {
        &self.query
    }
}
