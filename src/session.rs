//! Per-mount feed session.
//!
//! Composes the synchronizer, visibility cache, resume cache and (for the
//! reels feed) the navigation controller. One session is created per mount
//! and owns all of their state; nothing here is process-global.

use crate::config::Config;
use crate::feed::{
    AuthorDirectory, ContentItem, FeedEvent, FeedKind, FeedQuery, FeedSource, FeedSynchronizer,
    FeedUpdate, ResumeCache, SessionStore, SyncState, Unsubscribe, Viewer, VisibilityCache,
};
use crate::navigation::{Direction, NavCommand, NavigationController};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const TELEMETRY_TARGET: &str = "reelsync::telemetry";
const EVENT_BUFFER: usize = 64;

/// Tunables for one session, usually derived from [`Config`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub kind: FeedKind,
    pub page_size: usize,
    pub resume_items: usize,
    pub lookup_concurrency: usize,
    pub wheel_threshold: f64,
    pub transition_timeout: Duration,
    pub save_idle: Duration,
}

impl SessionOptions {
    pub fn from_config(config: &Config, kind: FeedKind) -> Self {
        Self {
            kind,
            page_size: config.page_size,
            resume_items: config.resume_items,
            lookup_concurrency: config.lookup_concurrency,
            wheel_threshold: config.wheel_threshold,
            transition_timeout: Duration::from_millis(config.transition_timeout_ms),
            save_idle: Duration::from_millis(config.save_idle_ms),
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&Config::default(), FeedKind::Reels)
    }
}

pub struct FeedSession {
    kind: FeedKind,
    sync: FeedSynchronizer,
    resume: ResumeCache,
    nav: Option<NavigationController>,
    /// What the render layer shows: the restored snapshot until the first
    /// live update, then the filtered live window.
    visible: Arc<Vec<ContentItem>>,
    restored: bool,
    deep_link: Option<String>,
    subscription: Option<Unsubscribe>,
    last_viewed: Option<String>,
}

impl FeedSession {
    /// Build a session and synchronously restore the last snapshot.
    ///
    /// Returns the receiver the owner must pump into
    /// [`handle_event`](Self::handle_event).
    pub fn mount(
        options: SessionOptions,
        viewer: Viewer,
        directory: Arc<dyn AuthorDirectory>,
        store: Arc<dyn SessionStore>,
        deep_link: Option<String>,
    ) -> (Self, mpsc::Receiver<FeedEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let query = FeedQuery::new(options.kind, options.page_size);
        let visibility = VisibilityCache::new(directory, options.lookup_concurrency);
        let sync = FeedSynchronizer::new(query, viewer, visibility, tx);
        let resume = ResumeCache::new(store, options.kind, options.resume_items, options.save_idle);

        let snapshot = resume.load();
        let restored = !snapshot.is_empty();
        let initial = snapshot.cursor_within(snapshot.items.len()).unwrap_or(0);

        let nav = options.kind.has_cursor().then(|| {
            NavigationController::new(
                snapshot.items.len(),
                initial,
                options.transition_timeout,
                options.wheel_threshold,
            )
        });

        tracing::info!(
            kind = %options.kind,
            restored_items = snapshot.items.len(),
            cursor = initial,
            deep_link = deep_link.as_deref().unwrap_or(""),
            "Feed session mounted"
        );

        let mut session = Self {
            kind: options.kind,
            sync,
            resume,
            nav,
            visible: Arc::new(snapshot.items),
            restored,
            deep_link,
            subscription: None,
            last_viewed: None,
        };
        (session, rx)
    }

    /// Subscribe to the data source. Call once per mount.
    pub fn start(&mut self, source: &dyn FeedSource) {
        if self.subscription.is_some() {
            tracing::warn!("Feed session already started, ignoring");
            return;
        }
        self.subscription = Some(self.sync.start(source));
    }

    /// Feed one engine event through. Returns true if the view changed.
    pub fn handle_event(&mut self, event: FeedEvent) -> bool {
        match self.sync.handle(event) {
            Some(update) => {
                self.apply_update(update);
                true
            }
            // Failures change the status line even without a new window
            None => matches!(self.sync.state(), SyncState::Failed(_)),
        }
    }

    fn apply_update(&mut self, update: FeedUpdate) {
        let was_restored = std::mem::replace(&mut self.restored, false);
        self.visible = Arc::new(update.visible());

        if let Some(nav) = self.nav.as_mut() {
            nav.set_len(self.visible.len());
            if was_restored && self.deep_link.is_some() {
                // Settles on the restored snapshot must not use up the deep link
                nav.forget_settles();
            }
        }
        self.try_deep_link();
        self.persist();
    }

    /// Seek to the deep-linked item. Only live windows are searched; the
    /// restored snapshot may place the item at a stale index.
    fn try_deep_link(&mut self) {
        if self.restored {
            return;
        }
        let (Some(nav), Some(target)) = (self.nav.as_mut(), self.deep_link.as_deref()) else {
            return;
        };
        if nav.has_settled() {
            tracing::debug!(target, "Cursor already settled, dropping deep link");
            self.deep_link = None;
            return;
        }
        if nav.seek(target, &self.visible) {
            self.deep_link = None;
            self.record_view();
        }
    }

    /// Snapshot the visible list, so the stored cursor indexes the same list
    /// it was taken against and suppressed authors never reach a restore.
    fn persist(&self) {
        let cursor = self.current_index().unwrap_or(0);
        self.resume.save(&self.visible, cursor);
    }

    fn record_view(&mut self) {
        let Some(index) = self.current_index() else {
            return;
        };
        let Some(item) = self.visible.get(index) else {
            return;
        };
        if self.last_viewed.as_deref() == Some(item.id.as_str()) {
            return;
        }
        tracing::info!(
            target: TELEMETRY_TARGET,
            item_id = %item.id,
            author_id = %item.author_id,
            index,
            total = self.visible.len(),
            "item_viewed"
        );
        self.last_viewed = Some(item.id.clone());
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    pub fn navigate(&mut self, direction: Direction) -> bool {
        self.nav.as_mut().is_some_and(|nav| nav.navigate(direction))
    }

    pub fn wheel(&mut self, delta_y: f64) -> bool {
        self.nav.as_mut().is_some_and(|nav| nav.wheel(delta_y))
    }

    pub fn key(&mut self, direction: Direction) -> bool {
        self.nav.as_mut().is_some_and(|nav| nav.key(direction))
    }

    /// Settle signal from the render layer.
    pub fn report_settled(&mut self, observed: usize) {
        let Some(nav) = self.nav.as_mut() else {
            return;
        };
        nav.report_settled(observed);
        self.record_view();
        self.persist();
    }

    /// Periodic housekeeping. Returns true if a transition lock was released.
    pub fn tick(&mut self) -> bool {
        self.nav.as_mut().is_some_and(|nav| nav.tick())
    }

    pub fn take_commands(&mut self) -> Vec<NavCommand> {
        self.nav
            .as_mut()
            .map(|nav| nav.take_commands())
            .unwrap_or_default()
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn kind(&self) -> FeedKind {
        self.kind
    }

    pub fn visible(&self) -> &[ContentItem] {
        &self.visible
    }

    pub fn current_index(&self) -> Option<usize> {
        self.nav.as_ref().and_then(|nav| nav.current_index())
    }

    pub fn current_item(&self) -> Option<&ContentItem> {
        self.current_index().and_then(|i| self.visible.get(i))
    }

    pub fn is_transitioning(&self) -> bool {
        self.nav.as_ref().is_some_and(|nav| nav.is_transitioning())
    }

    /// True while the first paint comes from the resume snapshot.
    pub fn is_restored(&self) -> bool {
        self.restored
    }

    pub fn is_loading(&self) -> bool {
        self.sync.is_loading()
    }

    pub fn state(&self) -> &SyncState {
        self.sync.state()
    }

    pub fn synchronizer(&self) -> &FeedSynchronizer {
        &self.sync
    }

    /// Tear down: stop the subscription and write the final snapshot.
    pub async fn unmount(mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.sync.close();

        let cursor = self.current_index().unwrap_or(0);
        if let Err(e) = self.resume.save_now(&self.visible, cursor).await {
            tracing::warn!(error = %e, "Failed to write resume snapshot on unmount");
        }
        tracing::info!(kind = %self.kind, "Feed session unmounted");
    }
}
