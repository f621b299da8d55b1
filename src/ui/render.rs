//! Render functions for the TUI.

use crate::app::App;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout},
    widgets::Paragraph,
    Frame,
};

use super::{posts, reel, status};

/// Minimum terminal dimensions required for normal operation.
pub(super) const MIN_WIDTH: u16 = 40;
pub(super) const MIN_HEIGHT: u16 = 10;

/// Main render dispatch function.
pub(super) fn render(f: &mut Frame, app: &App) {
    let area = f.area();

    // Nothing meaningful fits, and zero-sized areas panic some widgets
    if area.width < 1 || area.height < 1 {
        return;
    }

    if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
        let msg = if area.height < 3 || area.width < 20 {
            Paragraph::new("Too small")
        } else {
            Paragraph::new(format!(
                "Terminal too small\n\nMinimum: {}x{}\nCurrent: {}x{}",
                MIN_WIDTH, MIN_HEIGHT, area.width, area.height
            ))
            .alignment(Alignment::Center)
        };
        f.render_widget(msg, area);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(area);

    if app.session.kind().has_cursor() {
        reel::render(f, app, chunks[0]);
    } else {
        posts::render(f, app, chunks[0]);
    }
    status::render(f, app, chunks[1]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ratatui::{backend::TestBackend, Terminal};
    use reelsync::config::Config;
    use reelsync::feed::{
        ContentItem, FeedEvent, FeedKind, MediaKind, MediaRef, MemoryStore, SourceEvent,
        StaticDirectory, Viewer,
    };
    use reelsync::session::{FeedSession, SessionOptions};
    use std::sync::Arc;

    fn item(id: &str, author: &str, caption: &str) -> ContentItem {
        ContentItem {
            id: id.to_string(),
            author_id: author.to_string(),
            author_name: Some(format!("@{author}")),
            media: MediaRef {
                url: format!("https://cdn.example.com/{id}.mp4"),
                kind: MediaKind::Video,
            },
            caption: Some(caption.to_string()),
            created_at: Utc::now(),
            like_count: 1_240,
            comment_count: 7,
        }
    }

    fn app(kind: FeedKind) -> App {
        let options = SessionOptions {
            kind,
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
        app.handle_feed_event(FeedEvent::Source(SourceEvent::Snapshot(vec![
            item("r1", "alice", "first \x1b]0;pwned\x07reel"),
            item("r2", "bob", "second reel"),
        ])));
        app
    }

    fn screen(app: &App, width: u16, height: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal.draw(|f| render(f, app)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[tokio::test]
    async fn test_too_small_terminal() {
        let app = app(FeedKind::Reels);
        assert!(screen(&app, 30, 8).contains("Terminal too small"));
        assert!(screen(&app, 10, 2).contains("Too small"));
    }

    #[tokio::test]
    async fn test_reel_card_shows_current_item() {
        let app = app(FeedKind::Reels);
        let text = screen(&app, 60, 16);
        assert!(text.contains("@alice"));
        assert!(text.contains("first reel"));
        assert!(!text.contains("pwned"));
        assert!(text.contains("1/2"));
        assert!(text.contains("1.2K"));
    }

    #[tokio::test]
    async fn test_posts_list_shows_all_items() {
        let app = app(FeedKind::Posts);
        let text = screen(&app, 60, 16);
        assert!(text.contains("@alice"));
        assert!(text.contains("@bob"));
        assert!(text.contains("now"));
    }
}
