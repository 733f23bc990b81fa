//! Realtime change notifications.
//!
//! A [`ChangeFeed`] hands out per-user [`ChangeSubscription`]s. Dropping a
//! subscription unsubscribes it and closes any connection behind it.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::models::BookmarkId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    /// Notifications may have been missed; the subscriber should assume anything changed.
    Resync,
}

/// A row change for one user's bookmarks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub user_id: String,
    pub kind: ChangeKind,
    pub bookmark_id: Option<BookmarkId>,
}

/// Source of row change notifications.
pub trait ChangeFeed {
    /// Subscribe to changes on rows owned by `user_id`.
    fn subscribe(&self, user_id: &str) -> ChangeSubscription;
}

/// Stream of change events filtered to a single user
pub struct ChangeSubscription {
    user_id: String,
    receiver: broadcast::Receiver<ChangeEvent>,
    connection: Option<JoinHandle<()>>,
}

impl ChangeSubscription {
    pub(crate) fn new(user_id: &str, receiver: broadcast::Receiver<ChangeEvent>) -> Self {
        Self {
            user_id: user_id.to_string(),
            receiver,
            connection: None,
        }
    }

    /// Tie the task producing events to this subscription's lifetime.
    pub(crate) fn with_connection(mut self, connection: JoinHandle<()>) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Next event for this user, or `None` once the feed is closed.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.user_id == self.user_id => return Some(event),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Change subscription lagged");
                    return Some(ChangeEvent {
                        user_id: self.user_id.clone(),
                        kind: ChangeKind::Resync,
                        bookmark_id: None,
                    });
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.abort();
        }
    }
}
