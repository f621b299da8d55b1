use crate::app::App;
use ratatui::{
    layout::{Alignment, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};
use reelsync::feed::{ContentItem, MediaKind};
use reelsync::util::{format_count, sanitize_line, truncate_to_width};

/// Render the current reel as a full-height card.
pub fn render(f: &mut Frame, app: &App, area: Rect) {
    if area.width < 1 || area.height < 1 {
        return;
    }

    let visible = app.session.visible();
    let Some(index) = app.session.current_index() else {
        let msg = if app.session.is_loading() {
            "Loading reels..."
        } else {
            "No reels to show"
        };
        let paragraph = Paragraph::new(msg)
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).title(" Reels "));
        f.render_widget(paragraph, area);
        return;
    };

    // While a slide is running the render layer leads the controller: show the
    // target, entering from the side it is travelling from.
    let (shown, card_area) = match (app.viewport.slide(), app.viewport.progress()) {
        (Some(slide), Some(progress)) => (slide.to, slide_area(area, slide.from, slide.to, progress)),
        _ => (index, area),
    };
    let Some(item) = visible.get(shown).or_else(|| visible.get(index)) else {
        return;
    };

    let title = format!(" {}/{} ", shown + 1, visible.len());
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .title_alignment(Alignment::Right);
    let inner_width = card_area.width.saturating_sub(2) as usize;
    let paragraph = Paragraph::new(card_lines(item, inner_width))
        .block(block)
        .wrap(Wrap { trim: true });
    f.render_widget(paragraph, card_area);
}

/// Card rectangle `progress` of the way through a slide.
fn slide_area(area: Rect, from: usize, to: usize, progress: f64) -> Rect {
    let remaining = ((1.0 - progress.clamp(0.0, 1.0)) * area.height as f64) as u16;
    if remaining == 0 {
        return area;
    }
    let height = area.height - remaining;
    if to >= from {
        // Coming up from below
        Rect::new(area.x, area.y + remaining, area.width, height)
    } else {
        Rect::new(area.x, area.y, area.width, height)
    }
}

fn card_lines(item: &ContentItem, width: usize) -> Vec<Line<'static>> {
    let author = sanitize_line(item.author_label());
    let media_label = match item.media.kind {
        MediaKind::Video => "[video]",
        MediaKind::Image => "[image]",
    };
    let media_url = sanitize_line(&item.media.url);
    let media_width = width.saturating_sub(media_label.len() + 1);

    let mut lines = vec![
        Line::from(Span::styled(
            truncate_to_width(&author, width).into_owned(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(vec![
            Span::styled(media_label, Style::default().fg(Color::Cyan)),
            Span::raw(" "),
            Span::styled(
                truncate_to_width(&media_url, media_width).into_owned(),
                Style::default().fg(Color::DarkGray),
            ),
        ]),
        Line::default(),
    ];

    if let Some(caption) = item.caption.as_deref() {
        lines.push(Line::from(sanitize_line(caption)));
        lines.push(Line::default());
    }

    lines.push(Line::from(vec![
        Span::styled("likes ", Style::default().fg(Color::DarkGray)),
        Span::raw(format_count(item.like_count)),
        Span::styled("  comments ", Style::default().fg(Color::DarkGray)),
        Span::raw(format_count(item.comment_count)),
    ]));
    lines
}
