//! Live feed synchronization.
//!
//! This module turns a stream of feed windows into what a viewer is allowed
//! to see:
//!
//! - **Source**: subscriptions to the newest-first window of a feed
//! - **Visibility**: per-session author privacy cache with batched lookups
//! - **Sync**: the raw window plus the derived suppressed-author set
//! - **Resume**: bounded snapshot of the window and cursor for remounts
//!
//! # Architecture
//!
//! - [`source`] - [`FeedSource`] trait, in-process and HTTP polling sources
//! - [`visibility`] - [`VisibilityCache`] over an [`AuthorDirectory`]
//! - [`sync`] - [`FeedSynchronizer`], driven by [`FeedEvent`]s
//! - [`resume`] - [`ResumeCache`] over a [`SessionStore`]
//!
//! # Example
//!
//! ```ignore
//! use reelsync::feed::{FeedEvent, FeedSynchronizer, VisibilityCache};
//!
//! let (tx, mut rx) = tokio::sync::mpsc::channel(64);
//! let mut sync = FeedSynchronizer::new(query, viewer, VisibilityCache::new(dir, 8), tx);
//! let _guard = sync.start(&source);
//! while let Some(event) = rx.recv().await {
//!     if let Some(update) = sync.handle(event) {
//!         render(&update.visible());
//!     }
//! }
//! ```

pub mod resume;
pub mod source;
pub mod sync;
pub(crate) mod types;
pub mod visibility;

pub use resume::{
    MemoryStore, ResumeCache, ResumeSnapshot, SessionStore, StoreError, DEFAULT_RESUME_ITEMS,
};
pub use source::{
    ChannelSource, FeedSource, HttpPollingSource, SnapshotPublisher, SourceError, SourceEvent,
    Subscription,
};
pub use sync::{FeedEvent, FeedSynchronizer, SyncState, Unsubscribe};
pub use types::{
    filter_visible, ContentItem, FeedKind, FeedQuery, FeedUpdate, MediaKind, MediaRef, Viewer,
    MAX_PAGE_SIZE,
};
pub use visibility::{
    AuthorDirectory, AuthorRecord, HttpAuthorDirectory, LookupError, LookupOutcome,
    StaticDirectory, Visibility, VisibilityCache,
};
