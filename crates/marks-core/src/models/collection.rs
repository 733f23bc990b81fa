//! Domain-grouped bookmark collections
//!
//! Collections are never stored. They are derived from the full bookmark
//! list every time the list changes.

use std::collections::HashMap;

use serde::Serialize;
use url::Url;

use super::Bookmark;

/// Group key for bookmarks whose url has no parsable host.
pub const OTHER_DOMAIN: &str = "other";

/// Bookmarks sharing one hostname
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookmarkCollection {
    pub domain: String,
    pub count: usize,
    pub total_visits: u64,
    /// Members in list order
    pub bookmarks: Vec<Bookmark>,
}

/// Hostname of `raw` with a leading `www.` removed.
///
/// Relative or otherwise unparsable urls map to [`OTHER_DOMAIN`].
///
/// ```
/// use marks_core::models::domain_from_url;
///
/// assert_eq!(domain_from_url("https://www.github.com/rust-lang"), "github.com");
/// assert_eq!(domain_from_url("example.com"), "other");
/// ```
#[must_use]
pub fn domain_from_url(raw: &str) -> String {
    let Ok(parsed) = Url::parse(raw.trim()) else {
        return OTHER_DOMAIN.to_string();
    };
    match parsed.host_str() {
        Some(host) if !host.is_empty() => host.strip_prefix("www.").unwrap_or(host).to_string(),
        _ => OTHER_DOMAIN.to_string(),
    }
}

/// Group `bookmarks` by domain, most visited collection first.
///
/// Collections with equal visit totals keep the order in which their first
/// member appears in `bookmarks`.
#[must_use]
pub fn compute_collections(bookmarks: &[Bookmark]) -> Vec<BookmarkCollection> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut collections: Vec<BookmarkCollection> = Vec::new();

    for bookmark in bookmarks {
        let domain = domain_from_url(&bookmark.url);
        let position = *positions.entry(domain.clone()).or_insert_with(|| {
            collections.push(BookmarkCollection {
                domain,
                count: 0,
                total_visits: 0,
                bookmarks: Vec::new(),
            });
            collections.len() - 1
        });

        let collection = &mut collections[position];
        collection.count += 1;
        collection.total_visits += bookmark.visit_count;
        collection.bookmarks.push(bookmark.clone());
    }

    collections.sort_by(|left, right| right.total_visits.cmp(&left.total_visits));
    collections
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::models::BookmarkId;

    fn bookmark(id: &str, url: &str, visits: u64) -> Bookmark {
        Bookmark {
            id: BookmarkId::new(id),
            title: format!("Bookmark {id}"),
            url: url.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            visit_count: visits,
        }
    }

    #[test]
    fn domain_strips_leading_www_only() {
        assert_eq!(domain_from_url("https://www.example.com/a"), "example.com");
        assert_eq!(domain_from_url("https://docs.www.example.com"), "docs.www.example.com");
        assert_eq!(domain_from_url("http://EXAMPLE.com"), "example.com");
    }

    #[test]
    fn domain_falls_back_to_other() {
        assert_eq!(domain_from_url("example.com"), OTHER_DOMAIN);
        assert_eq!(domain_from_url(""), OTHER_DOMAIN);
        assert_eq!(domain_from_url("mailto:someone@example.com"), OTHER_DOMAIN);
    }

    #[test]
    fn collections_group_by_hostname_and_sum_visits() {
        let bookmarks = vec![
            bookmark("1", "https://www.github.com/a", 2),
            bookmark("2", "https://docs.rs/serde", 7),
            bookmark("3", "https://github.com/b", 4),
            bookmark("4", "not a url", 1),
        ];

        let collections = compute_collections(&bookmarks);

        let domains: Vec<&str> = collections.iter().map(|c| c.domain.as_str()).collect();
        assert_eq!(domains, vec!["docs.rs", "github.com", "other"]);

        let github = &collections[1];
        assert_eq!(github.count, 2);
        assert_eq!(github.total_visits, 6);
        let member_ids: Vec<&str> = github.bookmarks.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(member_ids, vec!["1", "3"]);

        let total: u64 = collections.iter().map(|c| c.total_visits).sum();
        let expected: u64 = bookmarks.iter().map(|b| b.visit_count).sum();
        assert_eq!(total, expected);
    }

    #[test]
    fn collections_with_equal_visits_keep_first_seen_order() {
        let bookmarks = vec![
            bookmark("1", "https://b.example", 0),
            bookmark("2", "https://a.example", 0),
        ];
        let domains: Vec<String> = compute_collections(&bookmarks)
            .into_iter()
            .map(|c| c.domain)
            .collect();
        assert_eq!(domains, vec!["b.example", "a.example"]);
    }

    #[test]
    fn collections_are_empty_for_empty_list() {
        assert!(compute_collections(&[]).is_empty());
    }

    #[test]
    fn collection_counts_always_match_list_length() {
        let urls = [
            "https://one.test",
            "https://www.one.test/x",
            "two.test",
            "https://three.test",
            "ftp://one.test",
        ];
        for len in 0..=urls.len() {
            let bookmarks: Vec<Bookmark> = urls[..len]
                .iter()
                .enumerate()
                .map(|(index, url)| bookmark(&index.to_string(), url, index as u64))
                .collect();
            let collections = compute_collections(&bookmarks);
            let counted: usize = collections.iter().map(|c| c.count).sum();
            assert_eq!(counted, bookmarks.len());
            for collection in &collections {
                assert!(collection
                    .bookmarks
                    .iter()
                    .all(|b| domain_from_url(&b.url) == collection.domain));
            }
        }
    }
}
