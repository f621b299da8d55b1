//! Live feed synchronization and reel navigation for a social feed client.
//!
//! - [`feed`] - subscriptions, author privacy filtering, resume snapshots
//! - [`navigation`] - single-flight reel cursor
//! - [`session`] - per-mount composition of the above
//! - [`storage`] - SQLite-backed session store
//! - [`config`] - TOML configuration
//! - [`util`] - URL vetting and terminal text helpers

pub mod config;
pub mod feed;
pub mod navigation;
pub mod session;
pub mod storage;
pub mod util;
