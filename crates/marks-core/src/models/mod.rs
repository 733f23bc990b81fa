//! Data models for Marks

mod bookmark;
mod collection;

pub use bookmark::{resolve_url, Bookmark, BookmarkId, NewBookmark, VisitCount};
pub use collection::{compute_collections, domain_from_url, BookmarkCollection, OTHER_DOMAIN};
