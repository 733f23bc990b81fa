use chrono::Utc;

use marks_core::view::{visible_items, ListView, EMPTY_LIST};

use crate::commands::common::{
    bookmark_to_list_item, fetch_bookmarks, format_bookmark_lines, format_list_header,
    BookmarkListItem,
};
use crate::context::ClientContext;
use crate::error::CliError;

pub async fn run_list(
    context: &ClientContext,
    view: ListView,
    as_json: bool,
) -> Result<(), CliError> {
    let items = fetch_bookmarks(context).await?;
    let visible = visible_items(&items, view);
    let now = Utc::now();

    if as_json {
        let json_items = visible
            .iter()
            .map(|bookmark| bookmark_to_list_item(bookmark, now))
            .collect::<Vec<BookmarkListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if visible.is_empty() {
        println!("{EMPTY_LIST}");
        return Ok(());
    }

    println!(
        "{} ({})",
        view.title(),
        format_list_header(visible.len(), items.len())
    );
    for line in format_bookmark_lines(&visible, now) {
        println!("{line}");
    }
    Ok(())
}
