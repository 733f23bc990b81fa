//! Bookmark model

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Opaque bookmark identifier assigned by the database.
///
/// Serialized as a string; numeric ids coming back from the database are
/// accepted and stringified.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BookmarkId(String);

impl BookmarkId {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookmarkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for BookmarkId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for BookmarkId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for BookmarkId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(i64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(value) => Self(value),
            RawId::Number(value) => Self(value.to_string()),
        })
    }
}

/// A saved bookmark owned by a single user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    /// Unique identifier
    pub id: BookmarkId,
    pub title: String,
    /// Stored as entered; only presence is validated
    pub url: String,
    /// Server-assigned creation time
    pub created_at: DateTime<Utc>,
    /// Server-maintained visit counter
    #[serde(default, deserialize_with = "null_as_zero")]
    pub visit_count: u64,
}

impl Bookmark {
    /// URL suitable for opening in a browser.
    #[must_use]
    pub fn resolved_url(&self) -> String {
        resolve_url(&self.url)
    }
}

/// Title/url pair submitted when creating a bookmark
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBookmark {
    pub title: String,
    pub url: String,
}

impl NewBookmark {
    /// Trim both fields, rejecting blank input.
    #[must_use]
    pub fn parse(title: &str, url: &str) -> Option<Self> {
        let title = title.trim();
        let url = url.trim();
        if title.is_empty() || url.is_empty() {
            return None;
        }
        Some(Self {
            title: title.to_string(),
            url: url.to_string(),
        })
    }
}

/// Visit counter after a tracked visit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitCount {
    pub id: BookmarkId,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub visit_count: u64,
}

/// Prefix scheme-less urls with `https://` so they can be opened.
///
/// ```
/// use marks_core::models::resolve_url;
///
/// assert_eq!(resolve_url("example.com"), "https://example.com");
/// assert_eq!(resolve_url("HTTP://example.com"), "HTTP://example.com");
/// ```
#[must_use]
pub fn resolve_url(url: &str) -> String {
    if url.is_empty() {
        return String::new();
    }
    let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

fn null_as_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Ok(Option::<u64>::deserialize(deserializer)?.unwrap_or(0))
}
