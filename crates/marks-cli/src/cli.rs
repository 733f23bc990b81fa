use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use marks_core::view::ListView;

#[derive(Parser)]
#[command(name = "marks")]
#[command(about = "Private bookmarks, live-synced across your sessions")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List bookmarks
    #[command(alias = "ls")]
    List {
        /// Which slice of the list to show
        #[arg(long, value_enum, default_value_t = ViewArg::Latest)]
        view: ViewArg,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show bookmarks grouped by domain
    Collections {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Save a bookmark
    #[command(alias = "new")]
    Add {
        /// Bookmark title
        title: String,
        /// Bookmark URL
        url: String,
    },
    /// Delete a bookmark
    #[command(alias = "rm")]
    Delete {
        /// Bookmark ID
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Record a visit and print the URL to open
    Visit {
        /// Bookmark ID
        id: String,
    },
    /// Live dashboard that stays in sync until you quit
    Watch {
        /// Initial list view
        #[arg(long, value_enum, default_value_t = ViewArg::Latest)]
        view: ViewArg,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Sign in or out of Supabase
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ViewArg {
    All,
    Latest,
    MostVisited,
}

impl From<ViewArg> for ListView {
    fn from(value: ViewArg) -> Self {
        match value {
            ViewArg::All => Self::All,
            ViewArg::Latest => Self::Latest,
            ViewArg::MostVisited => Self::MostVisited,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Login with Supabase email/password and store session in keychain
    Login {
        /// Supabase account email
        #[arg(long, value_name = "EMAIL")]
        email: String,
        /// Supabase account password
        #[arg(long, value_name = "PASSWORD")]
        password: String,
    },
    /// Show who is signed in
    Status,
    /// Logout and clear stored session
    Logout,
}
