//! Presentation helpers shared by the front ends.
//!
//! Nothing here touches the network or the store; front ends feed it state
//! snapshots and render the results.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::models::{Bookmark, BookmarkCollection, BookmarkId, NewBookmark};

/// How many bookmarks the `latest` view shows
pub const LATEST_LIMIT: usize = 5;

/// How long a notice stays on screen
pub const NOTICE_TTL: Duration = Duration::from_secs(3);

pub const ADDED_NOTICE: &str = "Bookmark added successfully!";
pub const DELETED_NOTICE: &str = "Bookmark deleted successfully!";
pub const EMPTY_LIST: &str = "No bookmarks yet.";
pub const EMPTY_COLLECTIONS: &str = "No bookmarks yet. Start adding to see collections!";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ListView {
    All,
    #[default]
    Latest,
    MostVisited,
}

impl ListView {
    pub const ALL: [Self; 3] = [Self::All, Self::Latest, Self::MostVisited];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Latest => "latest",
            Self::MostVisited => "most-visited",
        }
    }

    pub const fn title(self) -> &'static str {
        match self {
            Self::All => "All",
            Self::Latest => "Latest 5",
            Self::MostVisited => "Most Visited",
        }
    }
}

impl fmt::Display for ListView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListView {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "latest" => Ok(Self::Latest),
            "most-visited" | "most_visited" => Ok(Self::MostVisited),
            other => Err(format!(
                "unknown view '{other}' (expected all, latest, or most-visited)"
            )),
        }
    }
}

/// Items shown for `view`, given the list in store order (newest first).
///
/// `MostVisited` is a stable sort, so equal counts keep their list order.
pub fn visible_items(items: &[Bookmark], view: ListView) -> Vec<&Bookmark> {
    match view {
        ListView::All => items.iter().collect(),
        ListView::Latest => items.iter().take(LATEST_LIMIT).collect(),
        ListView::MostVisited => {
            let mut sorted: Vec<&Bookmark> = items.iter().collect();
            sorted.sort_by(|a, b| b.visit_count.cmp(&a.visit_count));
            sorted
        }
    }
}

/// Badge text for a bookmark row; hidden until the first visit.
pub fn visit_badge(visit_count: u64) -> Option<String> {
    (visit_count > 0).then(|| format!("{visit_count} visits"))
}

/// `"1 bookmark"` / `"3 bookmarks"`
pub fn bookmark_count_label(count: usize) -> String {
    if count == 1 {
        "1 bookmark".to_string()
    } else {
        format!("{count} bookmarks")
    }
}

pub fn collection_summary(collection: &BookmarkCollection) -> String {
    format!(
        "{} · {} · {} visits",
        collection.domain,
        bookmark_count_label(collection.count),
        collection.total_visits
    )
}

/// Form input check. Blank fields make the submit a no-op.
pub fn validate_form(title: &str, url: &str) -> Option<NewBookmark> {
    NewBookmark::parse(title, url)
}

/// Pending delete awaiting the user's answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteConfirmation {
    pub id: BookmarkId,
    pub title: String,
}

impl DeleteConfirmation {
    pub fn for_bookmark(bookmark: &Bookmark) -> Self {
        Self {
            id: bookmark.id.clone(),
            title: bookmark.title.clone(),
        }
    }

    pub fn prompt(&self) -> String {
        format!("Are you sure you want to delete \"{}\"?", self.title)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
    Info,
}

impl NoticeKind {
    pub const fn icon(self) -> &'static str {
        match self {
            Self::Success => "✓",
            Self::Error => "✕",
            Self::Info => "ℹ",
        }
    }
}

/// Transient message shown after an action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Info,
            message: message.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.icon(), self.message)
    }
}
