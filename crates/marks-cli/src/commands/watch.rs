//! Live dashboard.
//!
//! The screen re-renders on every store change. Refreshes come from the sync
//! session (poll, Supabase Realtime when configured, and Enter as a focus
//! event); commands typed on stdin mutate through the same actions the
//! one-shot commands use.

use std::io::{self, IsTerminal, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};

use marks_core::auth::{AccessTokenSource, SessionTokens};
use marks_core::state::{BookmarksAction, BookmarksState, LoadStatus};
use marks_core::sync::{focus_channel, ChangeFeed, SyncSession};
use marks_core::view::{
    validate_form, visible_items, DeleteConfirmation, ListView, Notice, ADDED_NOTICE,
    DELETED_NOTICE, EMPTY_LIST, NOTICE_TTL,
};
use marks_core::BookmarkId;

use crate::auth::SessionStore;
use crate::commands::common::{format_bookmark_lines, format_collection_lines, format_list_header};
use crate::context::ClientContext;
use crate::error::CliError;

const HELP_LINE: &str =
    "Enter refresh · a <url> <title> · v <id> · d <id> · view <all|latest|most-visited> · c collections · q quit";
const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchInput {
    Refresh,
    Add { url: String, title: String },
    Visit(BookmarkId),
    Delete(BookmarkId),
    Confirm(bool),
    View(ListView),
    ToggleCollections,
    Help,
    Quit,
    Unknown(String),
}

pub fn parse_watch_input(line: &str) -> WatchInput {
    let line = line.trim();
    let (command, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(command, rest)| (command, rest.trim()));

    match (command.to_ascii_lowercase().as_str(), rest) {
        ("", _) => WatchInput::Refresh,
        ("q" | "quit" | "exit", "") => WatchInput::Quit,
        ("y" | "yes", "") => WatchInput::Confirm(true),
        ("n" | "no", "") => WatchInput::Confirm(false),
        ("c" | "collections", "") => WatchInput::ToggleCollections,
        ("?" | "h" | "help", "") => WatchInput::Help,
        ("v" | "visit", id) if !id.is_empty() => WatchInput::Visit(BookmarkId::new(id)),
        ("d" | "delete", id) if !id.is_empty() => WatchInput::Delete(BookmarkId::new(id)),
        ("a" | "add", rest) => {
            let (url, title) = rest
                .split_once(char::is_whitespace)
                .map_or((rest, ""), |(url, title)| (url, title.trim()));
            WatchInput::Add {
                url: url.to_string(),
                title: title.to_string(),
            }
        }
        ("view", name) => name
            .parse::<ListView>()
            .map_or_else(WatchInput::Unknown, WatchInput::View),
        _ => WatchInput::Unknown(format!("unknown command '{line}'")),
    }
}

/// Screen state that lives outside the bookmark store
pub struct Dashboard {
    pub view: ListView,
    pub user_label: String,
    pub show_collections: bool,
    pub pending_delete: Option<DeleteConfirmation>,
    notice: Option<(Notice, Instant)>,
}

impl Dashboard {
    pub const fn new(view: ListView, user_label: String) -> Self {
        Self {
            view,
            user_label,
            show_collections: false,
            pending_delete: None,
            notice: None,
        }
    }

    pub fn set_notice(&mut self, notice: Notice, now: Instant) {
        self.notice = Some((notice, now));
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref().map(|(notice, _)| notice)
    }

    /// Drop the notice once it has been shown long enough.
    pub fn expire_notice(&mut self, now: Instant) -> bool {
        let expired = self
            .notice
            .as_ref()
            .is_some_and(|(_, shown_at)| now.duration_since(*shown_at) >= NOTICE_TTL);
        if expired {
            self.notice = None;
        }
        expired
    }

    pub fn render(&self, state: &BookmarksState) -> String {
        let now = Utc::now();
        let status = match state.status {
            LoadStatus::Idle => "idle",
            LoadStatus::Loading => "syncing",
            LoadStatus::Succeeded => "up to date",
            LoadStatus::Failed => "sync failed",
        };

        let mut lines = vec![format!("Marks · {} · {status}", self.user_label), String::new()];

        let visible = visible_items(&state.items, self.view);
        if visible.is_empty() {
            lines.push(EMPTY_LIST.to_string());
        } else {
            lines.push(format!(
                "{} ({})",
                self.view.title(),
                format_list_header(visible.len(), state.items.len())
            ));
            lines.extend(format_bookmark_lines(&visible, now));
        }

        if self.show_collections && !state.collections.is_empty() {
            lines.push(String::new());
            lines.push("Collections".to_string());
            lines.extend(format_collection_lines(&state.collections));
        }

        lines.push(String::new());
        if let Some(notice) = self.notice() {
            lines.push(notice.to_string());
        } else if let Some(error) = state.error.as_deref() {
            lines.push(Notice::error(error).to_string());
        }
        lines.push(HELP_LINE.to_string());
        lines.join("\n")
    }
}

pub async fn run_watch(context: &ClientContext, view: ListView) -> Result<(), CliError> {
    let session = context.require_session()?;
    let tokens = context.session_tokens()?;
    let changes = context
        .realtime_feed(&tokens)?
        .map(|feed| feed.subscribe(&session.user.id));
    if changes.is_none() {
        tracing::debug!("Supabase is not configured; watching by polling only");
    }

    let (focus, focus_events) = focus_channel();
    let sync = SyncSession::for_actions(
        context.actions.clone(),
        Arc::clone(&tokens),
        changes,
        Some(focus_events),
        context.config.sync_options(),
    );

    let mut dashboard = Dashboard::new(view, session.user.label().to_string());
    let mut state_changes = context.store().subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut notice_clock = tokio::time::interval(Duration::from_millis(500));
    let interactive = io::stdout().is_terminal();

    draw(&dashboard, &context.store().snapshot(), interactive)?;
    loop {
        tokio::select! {
            changed = state_changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_changes.borrow_and_update().clone();
                draw(&dashboard, &state, interactive)?;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match parse_watch_input(&line) {
                    WatchInput::Quit => break,
                    WatchInput::Refresh => {
                        focus.notify();
                    }
                    input => {
                        apply_input(context, &mut dashboard, &sync, &tokens, input).await;
                    }
                }
                draw(&dashboard, &context.store().snapshot(), interactive)?;
            }
            _ = notice_clock.tick() => {
                if dashboard.expire_notice(Instant::now()) {
                    draw(&dashboard, &context.store().snapshot(), interactive)?;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    sync.shutdown();
    context.store().dispatch(BookmarksAction::Cleared);
    tracing::debug!("Watch session ended");
    Ok(())
}

async fn apply_input(
    context: &ClientContext,
    dashboard: &mut Dashboard,
    sync: &SyncSession,
    tokens: &SessionTokens<SessionStore>,
    input: WatchInput,
) {
    let now = Instant::now();
    match input {
        WatchInput::Refresh | WatchInput::Quit => {}
        WatchInput::Add { url, title } => {
            let Some(bookmark) = validate_form(&title, &url) else {
                dashboard.set_notice(Notice::error("Title and URL are required"), now);
                return;
            };
            let Some(token) = fresh_token(tokens, dashboard, now).await else {
                return;
            };
            match context.actions.add(Some(&token), &bookmark).await {
                Ok(_) => dashboard.set_notice(Notice::success(ADDED_NOTICE), now),
                Err(error) => dashboard.set_notice(Notice::error(error.to_string()), now),
            }
        }
        WatchInput::Visit(id) => {
            let snapshot = context.store().snapshot();
            let Some(bookmark) = snapshot.items.iter().find(|bookmark| bookmark.id == id) else {
                dashboard.set_notice(Notice::error("Bookmark not found"), now);
                return;
            };
            let Some(token) = fresh_token(tokens, dashboard, now).await else {
                return;
            };
            context.actions.track_visit(Some(&token), &id).await;
            sync.schedule_visit_refetch();
            dashboard.set_notice(Notice::info(format!("Open {}", bookmark.resolved_url())), now);
        }
        WatchInput::Delete(id) => {
            let snapshot = context.store().snapshot();
            match snapshot.items.iter().find(|bookmark| bookmark.id == id) {
                Some(bookmark) => {
                    let confirmation = DeleteConfirmation::for_bookmark(bookmark);
                    dashboard.set_notice(
                        Notice::info(format!("{} (y/n)", confirmation.prompt())),
                        now,
                    );
                    dashboard.pending_delete = Some(confirmation);
                }
                None => dashboard.set_notice(Notice::error("Bookmark not found"), now),
            }
        }
        WatchInput::Confirm(confirmed) => {
            let Some(confirmation) = dashboard.pending_delete.take() else {
                return;
            };
            if !confirmed {
                dashboard.set_notice(Notice::info("Cancelled"), now);
                return;
            }
            let Some(token) = fresh_token(tokens, dashboard, now).await else {
                return;
            };
            match context.actions.delete(Some(&token), &confirmation.id).await {
                Ok(_) => dashboard.set_notice(Notice::success(DELETED_NOTICE), now),
                Err(error) => dashboard.set_notice(Notice::error(error.to_string()), now),
            }
        }
        WatchInput::View(view) => dashboard.view = view,
        WatchInput::ToggleCollections => dashboard.show_collections = !dashboard.show_collections,
        WatchInput::Help => dashboard.set_notice(Notice::info(HELP_LINE), now),
        WatchInput::Unknown(message) => dashboard.set_notice(Notice::error(message), now),
    }
}

async fn fresh_token(
    tokens: &SessionTokens<SessionStore>,
    dashboard: &mut Dashboard,
    now: Instant,
) -> Option<String> {
    match tokens.access_token().await {
        Ok(token) => Some(token),
        Err(error) => {
            dashboard.set_notice(Notice::error(error.to_string()), now);
            None
        }
    }
}

fn draw(dashboard: &Dashboard, state: &BookmarksState, interactive: bool) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    if interactive {
        write!(stdout, "{CLEAR_SCREEN}")?;
    }
    writeln!(stdout, "{}", dashboard.render(state))?;
    stdout.flush()
}
