//! Text helpers for rendering untrusted feed content in a terminal.

use chrono::{DateTime, Utc};
use std::borrow::Cow;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const ELLIPSIS: &str = "...";
const ELLIPSIS_WIDTH: usize = 3;

/// Terminal columns occupied by `s` (CJK and emoji count double).
///
/// ```
/// use reelsync::util::display_width;
///
/// assert_eq!(display_width("reel"), 4);
/// assert_eq!(display_width("\u{4f60}\u{597d}"), 4);
/// ```
pub fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

/// Cut `s` to at most `max_width` columns, appending "..." when cut.
///
/// Widths of 3 or less have no room for the ellipsis and return as many
/// characters as fit. Borrows when nothing is removed.
///
/// ```
/// use reelsync::util::truncate_to_width;
///
/// assert_eq!(truncate_to_width("caption", 10), "caption");
/// assert_eq!(truncate_to_width("a long caption", 8), "a lon...");
/// assert_eq!(truncate_to_width("abc", 2), "ab");
/// ```
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if display_width(s) <= max_width {
        return Cow::Borrowed(s);
    }
    if max_width <= ELLIPSIS_WIDTH {
        return Cow::Owned(take_columns(s, max_width).to_string());
    }
    let head = take_columns(s, max_width - ELLIPSIS_WIDTH);
    Cow::Owned(format!("{head}{ELLIPSIS}"))
}

/// Longest prefix of `s` that fits in `width` columns.
fn take_columns(s: &str, width: usize) -> &str {
    let mut used = 0;
    for (idx, c) in s.char_indices() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w > width {
            return &s[..idx];
        }
        used += w;
    }
    s
}

fn is_stripped_control(c: char) -> bool {
    c == '\u{7f}' || (c < ' ' && !matches!(c, '\t' | '\n' | '\r'))
}

/// Remove terminal control characters and ANSI escape sequences.
///
/// Captions and author names come straight from other users, so an
/// embedded `ESC ]` could retitle the terminal or worse. Drops CSI
/// (`ESC [` .. final byte), OSC (`ESC ]` .. BEL or `ESC \`), bare ESC, DEL and
/// C0 controls except tab, newline and carriage return.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(|c| c == '\u{1b}' || is_stripped_control(c)) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            match chars.peek() {
                Some('[') => {
                    chars.next();
                    for c in chars.by_ref() {
                        if ('\u{40}'..='\u{7e}').contains(&c) {
                            break;
                        }
                    }
                }
                Some(']') => {
                    chars.next();
                    while let Some(c) = chars.next() {
                        if c == '\u{07}' {
                            break;
                        }
                        if c == '\u{1b}' && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => {}
            }
        } else if !is_stripped_control(c) {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

/// Single-line form of user text: controls stripped, whitespace runs
/// (including newlines) collapsed to one space.
pub fn sanitize_line(s: &str) -> String {
    strip_control_chars(s)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Compact counter: `999`, `1.2K`, `3.4M`.
pub fn format_count(n: u64) -> String {
    match n {
        0..=999 => n.to_string(),
        1_000..=999_999 => format!("{:.1}K", n as f64 / 1_000.0),
        _ => format!("{:.1}M", n as f64 / 1_000_000.0),
    }
}

/// Short age of a post relative to `now`: `now`, `5m`, `3h`, `2d`, or the
/// date once it is more than a week old.
pub fn relative_time(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now.signed_duration_since(created_at);
    if age.num_minutes() < 1 {
        "now".to_string()
    } else if age.num_hours() < 1 {
        format!("{}m", age.num_minutes())
    } else if age.num_days() < 1 {
        format!("{}h", age.num_hours())
    } else if age.num_days() <= 7 {
        format!("{}d", age.num_days())
    } else {
        created_at.format("%Y-%m-%d").to_string()
    }
}
