//! Client-side bookmark state
//!
//! The state only changes through [`BookmarksAction`] values applied by
//! [`StateStore::dispatch`]. Collections are recomputed in full whenever the
//! item list changes.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::models::{compute_collections, Bookmark, BookmarkCollection, BookmarkId};

/// Load status of the bookmark list
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    #[default]
    Idle,
    Loading,
    Succeeded,
    Failed,
}

/// Snapshot of everything the views render
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BookmarksState {
    /// Newest first
    pub items: Vec<Bookmark>,
    pub collections: Vec<BookmarkCollection>,
    pub status: LoadStatus,
    /// Last user-facing error message
    pub error: Option<String>,
}

/// Outcome of an asynchronous bookmark operation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BookmarksAction {
    FetchPending,
    FetchSucceeded(Vec<Bookmark>),
    FetchFailed(String),
    AddPending,
    AddSucceeded(Bookmark),
    AddFailed(String),
    DeleteSucceeded(BookmarkId),
    DeleteFailed(String),
    VisitTracked,
    /// Session ended
    Cleared,
}

impl BookmarksAction {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::FetchPending => "fetch/pending",
            Self::FetchSucceeded(_) => "fetch/succeeded",
            Self::FetchFailed(_) => "fetch/failed",
            Self::AddPending => "add/pending",
            Self::AddSucceeded(_) => "add/succeeded",
            Self::AddFailed(_) => "add/failed",
            Self::DeleteSucceeded(_) => "delete/succeeded",
            Self::DeleteFailed(_) => "delete/failed",
            Self::VisitTracked => "visit/tracked",
            Self::Cleared => "cleared",
        }
    }
}

impl BookmarksState {
    /// Apply one transition.
    pub fn apply(&mut self, action: BookmarksAction) {
        match action {
            BookmarksAction::FetchPending => {
                self.status = LoadStatus::Loading;
                self.error = None;
            }
            BookmarksAction::FetchSucceeded(items) => {
                self.status = LoadStatus::Succeeded;
                self.replace_items(items);
            }
            BookmarksAction::FetchFailed(message) => {
                self.status = LoadStatus::Failed;
                self.error = Some(message);
            }
            BookmarksAction::AddPending => {
                self.error = None;
            }
            BookmarksAction::AddSucceeded(bookmark) => {
                let mut items = Vec::with_capacity(self.items.len() + 1);
                items.push(bookmark);
                items.append(&mut self.items);
                self.replace_items(items);
            }
            BookmarksAction::DeleteSucceeded(id) => {
                let items = std::mem::take(&mut self.items)
                    .into_iter()
                    .filter(|item| item.id != id)
                    .collect();
                self.replace_items(items);
            }
            BookmarksAction::AddFailed(message) | BookmarksAction::DeleteFailed(message) => {
                self.error = Some(message);
            }
            BookmarksAction::VisitTracked => {}
            BookmarksAction::Cleared => {
                *self = Self::default();
            }
        }
    }

    fn replace_items(&mut self, items: Vec<Bookmark>) {
        self.items = items;
        self.collections = compute_collections(&self.items);
    }
}

/// Shared handle to the bookmark state.
///
/// Cloning the handle shares the same state. Every dispatch is applied under
/// the channel's lock, so two transitions never interleave.
#[derive(Clone)]
pub struct StateStore {
    sender: Arc<watch::Sender<BookmarksState>>,
}

impl StateStore {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(BookmarksState::default());
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn dispatch(&self, action: BookmarksAction) {
        tracing::trace!(action = action.label(), "Dispatching bookmarks action");
        self.sender.send_modify(|state| state.apply(action));
    }

    /// Clone of the current state.
    #[must_use]
    pub fn snapshot(&self) -> BookmarksState {
        self.sender.borrow().clone()
    }

    /// Receiver notified after every dispatch.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<BookmarksState> {
        self.sender.subscribe()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
