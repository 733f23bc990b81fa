use crate::commands::common::{fetch_bookmarks, normalize_bookmark_id};
use crate::context::ClientContext;
use crate::error::CliError;

/// Print the URL to open and count the visit.
///
/// Tracking is best effort; a failed count never blocks the URL.
pub async fn run_visit(context: &ClientContext, id: &str) -> Result<(), CliError> {
    let id = normalize_bookmark_id(id)?;
    let items = fetch_bookmarks(context).await?;
    let bookmark = items
        .iter()
        .find(|bookmark| bookmark.id == id)
        .ok_or_else(|| CliError::BookmarkNotFound(id.to_string()))?;

    context.actions.track_visit(context.token(), &id).await;
    println!("{}", bookmark.resolved_url());
    Ok(())
}
