use marks_core::view::{validate_form, Notice, ADDED_NOTICE};

use crate::context::ClientContext;
use crate::error::CliError;

pub async fn run_add(context: &ClientContext, title: &str, url: &str) -> Result<(), CliError> {
    let bookmark = validate_form(title, url).ok_or(CliError::InvalidBookmark)?;
    let created = context.actions.add(context.token(), &bookmark).await?;

    println!("{}", Notice::success(ADDED_NOTICE));
    println!("{}", created.id);
    Ok(())
}
