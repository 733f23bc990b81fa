use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] marks_core::Error),
    #[error(transparent)]
    Config(#[from] marks_core::config::ConfigError),
    #[error(transparent)]
    Auth(#[from] marks_core::auth::AuthError),
    #[error(transparent)]
    Realtime(#[from] marks_core::sync::RealtimeError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Not signed in. Run `marks auth login` first.")]
    NotSignedIn,
    #[error("Title and URL are required")]
    InvalidBookmark,
    #[error("Bookmark not found: {0}")]
    BookmarkNotFound(String),
}
