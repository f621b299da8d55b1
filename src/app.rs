//! Viewer state for the terminal front end.
//!
//! `App` owns the mounted [`FeedSession`] and plays the render layer's part of
//! the navigation contract: it turns [`NavCommand`]s into slides and reports
//! the settled index back once a slide finishes.

use reelsync::config::Config;
use reelsync::feed::{FeedEvent, SyncState};
use reelsync::navigation::{Direction, NavCommand};
use reelsync::session::FeedSession;
use std::borrow::Cow;
use std::time::Duration;
use tokio::time::Instant;

/// How long transient status messages stay up.
const STATUS_TTL: Duration = Duration::from_secs(3);

/// Number of frames in the loading spinner animation.
pub const SPINNER_FRAMES: usize = 10;

/// An in-progress slide between two reels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slide {
    pub from: usize,
    pub to: usize,
    started: Instant,
}

/// Render-side scroll position.
#[derive(Debug)]
pub struct Viewport {
    slide: Option<Slide>,
    duration: Duration,
}

impl Viewport {
    pub fn new(duration: Duration) -> Self {
        Self {
            slide: None,
            duration,
        }
    }

    pub fn slide(&self) -> Option<Slide> {
        self.slide
    }

    pub fn animate(&mut self, from: usize, to: usize) {
        self.slide = Some(Slide {
            from,
            to,
            started: Instant::now(),
        });
    }

    /// Fraction of the slide completed, `None` when idle.
    pub fn progress(&self) -> Option<f64> {
        let slide = self.slide?;
        if self.duration.is_zero() {
            return Some(1.0);
        }
        let elapsed = slide.started.elapsed().as_secs_f64();
        Some((elapsed / self.duration.as_secs_f64()).min(1.0))
    }

    /// Finish the slide if its time is up. Returns the index it landed on.
    pub fn poll(&mut self) -> Option<usize> {
        if self.progress()? < 1.0 {
            return None;
        }
        self.slide.take().map(|slide| slide.to)
    }

    pub fn cancel(&mut self) {
        self.slide = None;
    }
}

pub struct App {
    pub session: FeedSession,
    pub viewport: Viewport,
    /// Pixel delta reported per wheel notch.
    pub wheel_step: f64,
    /// First visible row of the posts list.
    pub list_offset: usize,
    pub status_message: Option<(Cow<'static, str>, Instant)>,
    pub spinner_frame: usize,
    pub needs_redraw: bool,
}

impl App {
    pub fn new(session: FeedSession, config: &Config) -> Self {
        Self {
            session,
            viewport: Viewport::new(Duration::from_millis(config.animation_ms)),
            wheel_step: config.wheel_step,
            list_offset: 0,
            status_message: None,
            spinner_frame: 0,
            needs_redraw: true,
        }
    }

    pub fn into_session(self) -> FeedSession {
        self.session
    }

    pub fn set_status(&mut self, msg: impl Into<Cow<'static, str>>) {
        self.status_message = Some((msg.into(), Instant::now()));
        self.needs_redraw = true;
    }

    /// Clear the status message once it is older than [`STATUS_TTL`].
    /// Returns true if a message was cleared.
    pub fn clear_expired_status(&mut self) -> bool {
        match &self.status_message {
            Some((_, at)) if at.elapsed() >= STATUS_TTL => {
                self.status_message = None;
                true
            }
            _ => false,
        }
    }

    // ========================================================================
    // Engine
    // ========================================================================

    pub fn handle_feed_event(&mut self, event: FeedEvent) {
        let was_failed = matches!(self.session.state(), SyncState::Failed(_));
        if self.session.handle_event(event) {
            self.needs_redraw = true;
        }
        if !was_failed {
            if let SyncState::Failed(reason) = self.session.state() {
                let msg = format!("Feed paused: {reason}");
                self.set_status(msg);
            }
        }
        self.clamp_list_offset();
        self.apply_commands();
    }

    /// Carry out pending navigation instructions.
    pub fn apply_commands(&mut self) {
        for command in self.session.take_commands() {
            match command {
                NavCommand::AnimateTo(target) => {
                    let from = self
                        .viewport
                        .slide()
                        .map(|s| s.to)
                        .unwrap_or_else(|| target.saturating_sub(1));
                    self.viewport.animate(from, target);
                }
                NavCommand::JumpTo(target) => {
                    self.viewport.cancel();
                    self.session.report_settled(target);
                }
            }
            self.needs_redraw = true;
        }
    }

    // ========================================================================
    // Input
    // ========================================================================

    pub fn step(&mut self, direction: Direction) {
        if self.session.kind().has_cursor() {
            let from = self.session.current_index();
            if self.session.key(direction) {
                self.start_slide_from(from);
            }
        } else {
            self.scroll_list(direction);
        }
    }

    pub fn wheel(&mut self, direction: Direction) {
        if self.session.kind().has_cursor() {
            let delta = match direction {
                Direction::Next => self.wheel_step,
                Direction::Prev => -self.wheel_step,
            };
            let from = self.session.current_index();
            if self.session.wheel(delta) {
                self.start_slide_from(from);
            }
        } else {
            self.scroll_list(direction);
        }
    }

    /// Back to the newest item.
    pub fn jump_to_top(&mut self) {
        if self.session.kind().has_cursor() {
            self.viewport.cancel();
            self.session.take_commands();
            self.session.report_settled(0);
        } else {
            self.list_offset = 0;
        }
        self.needs_redraw = true;
    }

    fn start_slide_from(&mut self, from: Option<usize>) {
        for command in self.session.take_commands() {
            if let NavCommand::AnimateTo(target) = command {
                self.viewport.animate(from.unwrap_or(target), target);
            }
        }
        self.needs_redraw = true;
    }

    fn scroll_list(&mut self, direction: Direction) {
        self.list_offset = match direction {
            Direction::Next => self.list_offset.saturating_add(1),
            Direction::Prev => self.list_offset.saturating_sub(1),
        };
        self.clamp_list_offset();
        self.needs_redraw = true;
    }

    fn clamp_list_offset(&mut self) {
        let last = self.session.visible().len().saturating_sub(1);
        self.list_offset = self.list_offset.min(last);
    }

    // ========================================================================
    // Tick
    // ========================================================================

    pub fn tick(&mut self) {
        if let Some(landed) = self.viewport.poll() {
            self.session.report_settled(landed);
            self.needs_redraw = true;
        } else if self.viewport.slide().is_some() {
            self.needs_redraw = true;
        }

        if self.session.tick() {
            // Render layer never settled; stop drawing the stale slide
            self.viewport.cancel();
            self.needs_redraw = true;
        }

        if self.session.is_loading() {
            self.spinner_frame = (self.spinner_frame + 1) % SPINNER_FRAMES;
            self.needs_redraw = true;
        }

        if self.clear_expired_status() {
            self.needs_redraw = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use reelsync::feed::{
        ContentItem, FeedKind, MediaKind, MediaRef, MemoryStore, SourceError, SourceEvent,
        StaticDirectory, Viewer,
    };
    use reelsync::session::SessionOptions;
    use std::sync::Arc;
    use tokio::time;

    fn item(id: &str) -> ContentItem {
        ContentItem {
            id: id.to_string(),
            author_id: "author".to_string(),
            author_name: None,
            media: MediaRef {
                url: format!("https://cdn.example.com/{id}.mp4"),
                kind: MediaKind::Video,
            },
            caption: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            like_count: 0,
            comment_count: 0,
        }
    }

    fn app(kind: FeedKind) -> App {
        let options = SessionOptions {
            kind,
            save_idle: Duration::ZERO,
            ..SessionOptions::default()
        };
        let (session, _rx) = FeedSession::mount(
            options,
            Viewer::new("me", []),
            Arc::new(StaticDirectory::new()),
            Arc::new(MemoryStore::new()),
            None,
        );
        let mut app = App::new(session, &Config::default());
        let items = (0..5).map(|i| item(&format!("item-{i}"))).collect();
        app.handle_feed_event(FeedEvent::Source(SourceEvent::Snapshot(items)));
        app
    }

    #[tokio::test]
    async fn test_slide_reports_settle_after_animation() {
        time::pause();
        let mut app = app(FeedKind::Reels);

        app.step(Direction::Next);
        assert_eq!(app.viewport.slide().map(|s| (s.from, s.to)), Some((0, 1)));
        assert!(app.session.is_transitioning());

        time::advance(Duration::from_millis(100)).await;
        app.tick();
        assert!(app.session.is_transitioning());

        time::advance(Duration::from_millis(100)).await;
        app.tick();
        assert!(app.viewport.slide().is_none());
        assert!(!app.session.is_transitioning());
        assert_eq!(app.session.current_index(), Some(1));
    }

    #[tokio::test]
    async fn test_wheel_uses_configured_step() {
        time::pause();
        let mut app = app(FeedKind::Reels);
        app.wheel_step = 10.0;
        app.wheel(Direction::Next);
        // Below the 30px threshold
        assert_eq!(app.session.current_index(), Some(0));

        app.wheel_step = 100.0;
        app.wheel(Direction::Next);
        assert_eq!(app.session.current_index(), Some(1));
    }

    #[tokio::test]
    async fn test_jump_to_top_settles_immediately() {
        time::pause();
        let mut app = app(FeedKind::Reels);
        app.session.report_settled(3);
        app.step(Direction::Next);

        app.jump_to_top();
        assert!(app.viewport.slide().is_none());
        assert!(!app.session.is_transitioning());
        assert_eq!(app.session.current_index(), Some(0));
    }

    #[tokio::test]
    async fn test_posts_mode_scrolls_list() {
        let mut app = app(FeedKind::Posts);
        app.step(Direction::Next);
        app.step(Direction::Next);
        assert_eq!(app.list_offset, 2);
        for _ in 0..10 {
            app.wheel(Direction::Next);
        }
        assert_eq!(app.list_offset, 4);
        app.jump_to_top();
        assert_eq!(app.list_offset, 0);
    }

    #[tokio::test]
    async fn test_failure_sets_status_once() {
        let mut app = app(FeedKind::Reels);
        app.handle_feed_event(FeedEvent::Source(SourceEvent::Failed(SourceError::Timeout)));
        let (msg, _) = app.status_message.clone().unwrap();
        assert!(msg.starts_with("Feed paused"));
        assert_eq!(app.session.visible().len(), 5);
    }

    #[tokio::test]
    async fn test_status_expires() {
        time::pause();
        let mut app = app(FeedKind::Reels);
        app.set_status("hello");
        time::advance(Duration::from_secs(2)).await;
        assert!(!app.clear_expired_status());
        time::advance(Duration::from_secs(1)).await;
        assert!(app.clear_expired_status());
        assert!(app.status_message.is_none());
    }
}
