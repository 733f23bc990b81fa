//! marks-core - Core library for Marks
//!
//! This crate contains the shared bookmark models, the client-side state
//! store, the HTTP client for the bookmarks API, and the sync strategy used
//! by the Marks front ends.

pub mod actions;
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod state;
pub mod sync;
pub mod util;
pub mod view;

pub use error::{Error, Result};
pub use models::{Bookmark, BookmarkCollection, BookmarkId, NewBookmark};
