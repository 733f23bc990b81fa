use std::io::{self, BufRead, Write};

use chrono::{DateTime, Utc};
use serde::Serialize;

use marks_core::models::BookmarkCollection;
use marks_core::view::{bookmark_count_label, collection_summary, visit_badge};
use marks_core::{Bookmark, BookmarkId};

use crate::context::ClientContext;
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct BookmarkListItem {
    pub id: String,
    pub title: String,
    pub url: String,
    pub open_url: String,
    pub created_at: DateTime<Utc>,
    pub visit_count: u64,
    pub relative_time: String,
}

pub fn bookmark_to_list_item(bookmark: &Bookmark, now: DateTime<Utc>) -> BookmarkListItem {
    BookmarkListItem {
        id: bookmark.id.to_string(),
        title: bookmark.title.clone(),
        url: bookmark.url.clone(),
        open_url: bookmark.resolved_url(),
        created_at: bookmark.created_at,
        visit_count: bookmark.visit_count,
        relative_time: format_relative_time(bookmark.created_at, now),
    }
}

pub fn format_bookmark_lines(bookmarks: &[&Bookmark], now: DateTime<Utc>) -> Vec<String> {
    bookmarks
        .iter()
        .map(|bookmark| {
            let id = bookmark.id.to_string();
            let title = truncate(&bookmark.title, 30);
            let relative_time = format_relative_time(bookmark.created_at, now);
            match visit_badge(bookmark.visit_count) {
                Some(badge) => format!(
                    "{id:<10}  {title:<30}  {relative_time:<8}  {}  ({badge})",
                    bookmark.url
                ),
                None => format!("{id:<10}  {title:<30}  {relative_time:<8}  {}", bookmark.url),
            }
        })
        .collect()
}

pub fn format_collection_lines(collections: &[BookmarkCollection]) -> Vec<String> {
    let mut lines = Vec::new();
    for collection in collections {
        lines.push(collection_summary(collection));
        for bookmark in &collection.bookmarks {
            lines.push(format!(
                "  {:<10}  {}  [{}]",
                bookmark.id.to_string(),
                truncate(&bookmark.title, 40),
                bookmark.visit_count
            ));
        }
    }
    lines
}

pub fn format_list_header(shown: usize, total: usize) -> String {
    if shown == total {
        bookmark_count_label(total)
    } else {
        format!("{shown} of {}", bookmark_count_label(total))
    }
}

pub fn format_relative_time(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now.signed_duration_since(timestamp).num_seconds().max(0);
    let minute = 60;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn truncate(value: &str, max_chars: usize) -> String {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let mut truncated = collapsed
            .chars()
            .take(max_chars.saturating_sub(3))
            .collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn normalize_bookmark_id(raw: &str) -> Result<BookmarkId, CliError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CliError::BookmarkNotFound(raw.to_string()));
    }
    Ok(BookmarkId::new(trimmed))
}

/// Load the list into the store, reporting when there is nobody to load for.
pub async fn fetch_bookmarks(context: &ClientContext) -> Result<Vec<Bookmark>, CliError> {
    if context.token().is_none() {
        eprintln!("Not signed in; run `marks auth login` to see your bookmarks.");
    }
    Ok(context.actions.fetch(context.token()).await?)
}

/// Ask a yes/no question; anything but `y`/`yes` is a no.
pub fn confirm(
    prompt: &str,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> io::Result<bool> {
    write!(output, "{prompt} [y/N] ")?;
    output.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}
