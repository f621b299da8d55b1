use crate::app::App;
use chrono::Utc;
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};
use reelsync::util::{display_width, relative_time, sanitize_line, truncate_to_width};

/// Width of the age column, including its trailing gap.
const AGE_WIDTH: usize = 12;

/// Render the chronological feed as a plain list.
pub fn render(f: &mut Frame, app: &App, area: Rect) {
    if area.width < 1 || area.height < 1 {
        return;
    }

    let block = Block::default().borders(Borders::ALL).title(" Posts ");
    let visible = app.session.visible();
    if visible.is_empty() {
        let msg = if app.session.is_loading() {
            "Loading posts..."
        } else {
            "No posts to show"
        };
        f.render_widget(Paragraph::new(msg).block(block), area);
        return;
    }

    let now = Utc::now();
    let inner_width = area.width.saturating_sub(2) as usize;
    let rows: Vec<ListItem> = visible
        .iter()
        .skip(app.list_offset)
        .map(|item| {
            let age = relative_time(item.created_at, now);
            let author = sanitize_line(item.author_label());
            let author = truncate_to_width(&author, 20).into_owned();
            let used = AGE_WIDTH + display_width(&author) + 2;
            let caption = item
                .caption
                .as_deref()
                .map(sanitize_line)
                .unwrap_or_default();
            let caption = truncate_to_width(&caption, inner_width.saturating_sub(used)).into_owned();

            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{age:>width$}  ", width = AGE_WIDTH - 2),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(author, Style::default().add_modifier(Modifier::BOLD)),
                Span::raw("  "),
                Span::raw(caption),
            ]))
        })
        .collect();

    f.render_widget(List::new(rows).block(block), area);
}
