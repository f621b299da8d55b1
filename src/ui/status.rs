use crate::app::App;
use ratatui::{
    layout::Rect,
    style::{Color, Style},
    widgets::Paragraph,
    Frame,
};
use reelsync::feed::SyncState;
use std::borrow::Cow;

const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Render the status bar
pub fn render(f: &mut Frame, app: &App, area: Rect) {
    if area.width < 1 || area.height < 1 {
        return;
    }

    let state: Cow<'_, str> = match app.session.state() {
        SyncState::Subscribing => {
            Cow::Owned(format!("{} loading", SPINNER[app.spinner_frame % SPINNER.len()]))
        }
        SyncState::Streaming => Cow::Borrowed("live"),
        SyncState::Failed(_) => Cow::Borrowed("paused"),
        SyncState::Closed => Cow::Borrowed("closed"),
    };
    let restored = if app.session.is_restored() {
        " (restored)"
    } else {
        ""
    };

    let text: Cow<'_, str> = if let Some((msg, _)) = &app.status_message {
        Cow::Borrowed(msg.as_ref())
    } else if app.session.kind().has_cursor() {
        Cow::Owned(format!(
            "[{state}{restored}] [j/k]next/prev [g]top [q]uit"
        ))
    } else {
        Cow::Owned(format!("[{state}{restored}] [j/k]scroll [g]top [q]uit"))
    };

    let style = match app.session.state() {
        SyncState::Failed(_) => Style::default().bg(Color::Red).fg(Color::White),
        _ => Style::default().bg(Color::DarkGray).fg(Color::White),
    };
    f.render_widget(Paragraph::new(text).style(style), area);
}
