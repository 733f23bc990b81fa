use marks_core::view::EMPTY_COLLECTIONS;

use crate::commands::common::{fetch_bookmarks, format_collection_lines};
use crate::context::ClientContext;
use crate::error::CliError;

pub async fn run_collections(context: &ClientContext, as_json: bool) -> Result<(), CliError> {
    fetch_bookmarks(context).await?;
    let collections = context.store().snapshot().collections;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&collections)?);
    } else if collections.is_empty() {
        println!("{EMPTY_COLLECTIONS}");
    } else {
        for line in format_collection_lines(&collections) {
            println!("{line}");
        }
    }
    Ok(())
}
