use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Hard cap on the feed window. Snapshots longer than this are truncated.
pub const MAX_PAGE_SIZE: usize = 50;

// ============================================================================
// Content Items
// ============================================================================

/// Kind of media attached to a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// Reference to the media of a post. The engine never touches the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub url: String,
    pub kind: MediaKind,
}

/// A single post in the feed window.
///
/// `id` and `created_at` never change for a given item; the social counters
/// may differ between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: String,
    pub author_id: String,
    #[serde(default)]
    pub author_name: Option<String>,
    pub media: MediaRef,
    #[serde(default)]
    pub caption: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub comment_count: u64,
}

impl ContentItem {
    /// Name to display for the author, falling back to the raw id.
    pub fn author_label(&self) -> &str {
        self.author_name.as_deref().unwrap_or(&self.author_id)
    }
}

// ============================================================================
// Queries and Viewer
// ============================================================================

/// Which feed is mounted.
///
/// `Reels` is the full-screen swipeable video feed and is the only variant
/// that carries a navigation cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    Posts,
    Reels,
}

impl FeedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedKind::Posts => "posts",
            FeedKind::Reels => "reels",
        }
    }

    pub fn has_cursor(&self) -> bool {
        matches!(self, FeedKind::Reels)
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FeedKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "posts" | "chronological" => Ok(FeedKind::Posts),
            "reels" | "videos" => Ok(FeedKind::Reels),
            other => Err(format!("unknown feed kind: {other}")),
        }
    }
}

/// Subscription parameters handed to a [`FeedSource`](super::FeedSource).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedQuery {
    pub kind: FeedKind,
    pub limit: usize,
}

impl FeedQuery {
    pub fn new(kind: FeedKind, limit: usize) -> Self {
        Self {
            kind,
            limit: limit.clamp(1, MAX_PAGE_SIZE),
        }
    }
}

/// The signed-in user looking at the feed.
#[derive(Debug, Clone, Default)]
pub struct Viewer {
    pub id: String,
    pub following: HashSet<String>,
}

impl Viewer {
    pub fn new(id: impl Into<String>, following: impl IntoIterator<Item = String>) -> Self {
        Self {
            id: id.into(),
            following: following.into_iter().collect(),
        }
    }
}

// ============================================================================
// Engine Output
// ============================================================================

/// One `onUpdate` emission: the raw window plus the authors to hide.
///
/// Both halves are `Arc`s so an update can be handed to the render layer
/// without copying the window.
#[derive(Debug, Clone)]
pub struct FeedUpdate {
    pub items: Arc<Vec<ContentItem>>,
    pub suppressed: Arc<HashSet<String>>,
}

impl FeedUpdate {
    /// Items whose author is not suppressed, in window order.
    pub fn visible(&self) -> Vec<ContentItem> {
        filter_visible(&self.items, &self.suppressed)
    }
}

/// Drop items by suppressed authors, keeping the relative order of the rest.
pub fn filter_visible(items: &[ContentItem], suppressed: &HashSet<String>) -> Vec<ContentItem> {
    items
        .iter()
        .filter(|item| !suppressed.contains(&item.author_id))
        .cloned()
        .collect()
}

#[cfg(test)]
pub(crate) fn test_item(id: &str, author: &str) -> ContentItem {
    ContentItem {
        id: id.to_string(),
        author_id: author.to_string(),
        author_name: None,
        media: MediaRef {
            url: format!("https://cdn.example.com/{id}.mp4"),
            kind: MediaKind::Video,
        },
        caption: Some(format!("caption for {id}")),
        created_at: DateTime::from_timestamp(1_704_067_200, 0).unwrap_or_default(),
        like_count: 0,
        comment_count: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_wire_format_is_camel_case() {
        let json = r#"{
            "id": "p1",
            "authorId": "alice",
            "media": {"url": "https://cdn.example.com/p1.mp4", "kind": "video"},
            "createdAt": "2024-01-01T00:00:00Z",
            "likeCount": 3
        }"#;
        let item: ContentItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.author_id, "alice");
        assert_eq!(item.media.kind, MediaKind::Video);
        assert_eq!(item.like_count, 3);
        assert_eq!(item.comment_count, 0);
        assert_eq!(item.author_label(), "alice");
    }

    #[test]
    fn test_feed_query_clamps_limit() {
        assert_eq!(FeedQuery::new(FeedKind::Reels, 500).limit, MAX_PAGE_SIZE);
        assert_eq!(FeedQuery::new(FeedKind::Posts, 0).limit, 1);
    }

    #[test]
    fn test_feed_kind_from_str() {
        assert_eq!("reels".parse::<FeedKind>(), Ok(FeedKind::Reels));
        assert_eq!("Posts".parse::<FeedKind>(), Ok(FeedKind::Posts));
        assert!("stories".parse::<FeedKind>().is_err());
    }

    #[test]
    fn test_filter_visible_preserves_order() {
        let items = vec![
            test_item("1", "a"),
            test_item("2", "b"),
            test_item("3", "a"),
            test_item("4", "c"),
        ];
        let suppressed: HashSet<String> = ["b".to_string()].into_iter().collect();
        let ids: Vec<_> = filter_visible(&items, &suppressed)
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec!["1", "3", "4"]);
    }
}
