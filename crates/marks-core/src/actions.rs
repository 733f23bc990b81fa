//! Asynchronous bookmark operations that feed the state store.
//!
//! Each operation dispatches its pending/succeeded/failed outcome into the
//! [`StateStore`] and also returns it to the caller.

use crate::api::BookmarksApi;
use crate::error::{Error, Result};
use crate::models::{Bookmark, BookmarkId, NewBookmark};
use crate::state::{BookmarksAction, StateStore};

#[derive(Clone)]
pub struct BookmarkActions {
    api: Option<BookmarksApi>,
    store: StateStore,
}

impl BookmarkActions {
    /// `api` is `None` when no API base URL is configured.
    pub const fn new(api: Option<BookmarksApi>, store: StateStore) -> Self {
        Self { api, store }
    }

    pub const fn store(&self) -> &StateStore {
        &self.store
    }

    /// Load the full list.
    ///
    /// Without an API URL or token there is nothing to load, so the list
    /// resolves to empty instead of failing.
    pub async fn fetch(&self, token: Option<&str>) -> Result<Vec<Bookmark>> {
        self.store.dispatch(BookmarksAction::FetchPending);

        let (Some(api), Some(token)) = (self.api.as_ref(), token) else {
            self.store.dispatch(BookmarksAction::FetchSucceeded(Vec::new()));
            return Ok(Vec::new());
        };

        match api.list(token).await {
            Ok(items) => {
                tracing::debug!(count = items.len(), "Fetched bookmarks");
                self.store.dispatch(BookmarksAction::FetchSucceeded(items.clone()));
                Ok(items)
            }
            Err(error) => {
                self.store.dispatch(BookmarksAction::FetchFailed(error.to_string()));
                Err(error)
            }
        }
    }

    pub async fn add(&self, token: Option<&str>, bookmark: &NewBookmark) -> Result<Bookmark> {
        self.store.dispatch(BookmarksAction::AddPending);

        let result = match (self.api.as_ref(), token) {
            (Some(api), Some(token)) => api.create(token, bookmark).await,
            _ => Err(Error::MissingCredentials),
        };

        match &result {
            Ok(created) => self.store.dispatch(BookmarksAction::AddSucceeded(created.clone())),
            Err(error) => self.store.dispatch(BookmarksAction::AddFailed(error.to_string())),
        }
        result
    }

    pub async fn delete(&self, token: Option<&str>, id: &BookmarkId) -> Result<BookmarkId> {
        let result = match (self.api.as_ref(), token) {
            (Some(api), Some(token)) => api.delete(token, id).await,
            _ => Err(Error::MissingCredentials),
        };

        match &result {
            Ok(deleted) => self.store.dispatch(BookmarksAction::DeleteSucceeded(deleted.clone())),
            Err(error) => self.store.dispatch(BookmarksAction::DeleteFailed(error.to_string())),
        }
        result
    }

    /// Record a visit. Failures are logged and otherwise ignored; callers
    /// re-fetch to observe the new count.
    pub async fn track_visit(&self, token: Option<&str>, id: &BookmarkId) {
        let (Some(api), Some(token)) = (self.api.as_ref(), token) else {
            return;
        };

        match api.track_visit(token, id).await {
            Ok(visit) => {
                tracing::debug!(visit_count = visit.visit_count, "Tracked bookmark visit");
                self.store.dispatch(BookmarksAction::VisitTracked);
            }
            Err(error) => {
                tracing::debug!(%error, "Visit tracking failed");
            }
        }
    }
}
