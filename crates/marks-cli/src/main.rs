//! Marks CLI - private bookmarks from the terminal
//!
//! One-shot commands for listing and editing, plus a live `watch` dashboard.

mod auth;
mod cli;
mod commands;
mod context;
mod error;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use marks_core::config::ClientConfig;

use crate::cli::{Cli, Commands};
use crate::commands::add::run_add;
use crate::commands::auth_cmd::run_auth;
use crate::commands::collections::run_collections;
use crate::commands::completions::run_completions;
use crate::commands::delete::run_delete;
use crate::commands::list::run_list;
use crate::commands::visit::run_visit;
use crate::commands::watch::run_watch;
use crate::context::ClientContext;
use crate::error::CliError;


#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("marks=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref())?,
        Commands::Auth { command } => run_auth(command, &ClientConfig::from_env()?).await?,
        command => {
            let context = ClientContext::load().await?;
            match command {
                Commands::List { view, json } => run_list(&context, view.into(), json).await?,
                Commands::Collections { json } => run_collections(&context, json).await?,
                Commands::Add { title, url } => run_add(&context, &title, &url).await?,
                Commands::Delete { id, yes } => run_delete(&context, &id, yes).await?,
                Commands::Visit { id } => run_visit(&context, &id).await?,
                Commands::Watch { view } => run_watch(&context, view.into()).await?,
                Commands::Completions { .. } | Commands::Auth { .. } => {}
            }
        }
    }

    Ok(())
}
