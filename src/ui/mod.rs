//! Terminal User Interface module.
//!
//! # Module Structure
//!
//! - `loop_runner` - Main event loop and terminal management
//! - `input` - Keyboard and mouse input mapping
//! - `render` - View rendering dispatch
//! - `reel` - Full-height card for the reels feed
//! - `posts` - List view for the chronological feed
//! - `status` - Status bar widget

mod input;
mod loop_runner;
mod posts;
mod reel;
mod render;
mod status;

pub use loop_runner::{run, Action};
