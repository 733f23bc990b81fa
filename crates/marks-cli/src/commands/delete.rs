use std::io::{self, IsTerminal};

use marks_core::view::{DeleteConfirmation, Notice, DELETED_NOTICE};

use crate::commands::common::{confirm, fetch_bookmarks, normalize_bookmark_id};
use crate::context::ClientContext;
use crate::error::CliError;

pub async fn run_delete(
    context: &ClientContext,
    id: &str,
    skip_confirm: bool,
) -> Result<(), CliError> {
    let id = normalize_bookmark_id(id)?;

    if !skip_confirm {
        let items = fetch_bookmarks(context).await?;
        let bookmark = items
            .iter()
            .find(|bookmark| bookmark.id == id)
            .ok_or_else(|| CliError::BookmarkNotFound(id.to_string()))?;
        let confirmation = DeleteConfirmation::for_bookmark(bookmark);

        if !io::stdin().is_terminal() {
            return Err(CliError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "refusing to delete without a terminal; pass --yes to confirm",
            )));
        }
        let confirmed = confirm(
            &confirmation.prompt(),
            &mut io::stdin().lock(),
            &mut io::stdout(),
        )?;
        if !confirmed {
            println!("Cancelled");
            return Ok(());
        }
    }

    let deleted = context.actions.delete(context.token(), &id).await?;
    println!("{}", Notice::success(DELETED_NOTICE));
    println!("{deleted}");
    Ok(())
}
