//! Keeps the client store fresh while a session is active.
//!
//! Three independent sources request a refresh: realtime change
//! notifications, a fixed poll interval, and focus-regain events. A visit
//! also schedules a delayed refresh so the new count shows up. The sources
//! overlap on purpose; any single one is enough for eventual consistency.
//!
//! All requests flow into one channel drained by a single refresher task,
//! which waits out a short debounce window and collapses whatever arrived in
//! the meantime into one refresh. Refreshes therefore never overlap.

mod realtime;
mod supabase;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::actions::BookmarkActions;
use crate::auth::AccessTokenSource;
use crate::state::BookmarksAction;

pub use realtime::{ChangeEvent, ChangeFeed, ChangeKind, ChangeSubscription};
pub use supabase::{RealtimeError, SupabaseRealtimeFeed};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);
pub const DEFAULT_VISIT_REFETCH_DELAY: Duration = Duration::from_millis(500);

/// Why a refresh was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    SessionStart,
    Realtime,
    Poll,
    Focus,
    Visit,
}

impl SyncTrigger {
    pub const fn label(self) -> &'static str {
        match self {
            Self::SessionStart => "session_start",
            Self::Realtime => "realtime",
            Self::Poll => "poll",
            Self::Focus => "focus",
            Self::Visit => "visit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub poll_interval: Duration,
    pub debounce: Duration,
    pub visit_refetch_delay: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            debounce: DEFAULT_DEBOUNCE,
            visit_refetch_delay: DEFAULT_VISIT_REFETCH_DELAY,
        }
    }
}

/// Sender half used by whatever observes window/terminal focus.
#[derive(Clone)]
pub struct FocusHandle {
    sender: mpsc::UnboundedSender<()>,
}

impl FocusHandle {
    /// Report a focus regain. Returns `false` once the session is gone.
    pub fn notify(&self) -> bool {
        self.sender.send(()).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Receiver half consumed by the sync session.
pub struct FocusEvents {
    receiver: mpsc::UnboundedReceiver<()>,
}

pub fn focus_channel() -> (FocusHandle, FocusEvents) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (FocusHandle { sender }, FocusEvents { receiver })
}

/// Running sync triggers for one signed-in session.
///
/// Dropping the session aborts every trigger task, which drops the realtime
/// subscription and the focus receiver with them.
pub struct SyncSession {
    triggers: mpsc::UnboundedSender<SyncTrigger>,
    visits: mpsc::UnboundedSender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncSession {
    /// Start all triggers around `refresh`.
    ///
    /// A refresh is requested immediately so the session starts with fresh
    /// data.
    pub fn start<R, Fut>(
        refresh: R,
        realtime: Option<ChangeSubscription>,
        focus: Option<FocusEvents>,
        options: SyncOptions,
    ) -> Self
    where
        R: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (triggers, trigger_receiver) = mpsc::unbounded_channel();
        let (visits, visit_receiver) = mpsc::unbounded_channel();

        let mut tasks = vec![
            tokio::spawn(run_refresher(
                Arc::new(refresh),
                trigger_receiver,
                options.debounce,
            )),
            tokio::spawn(run_poller(triggers.clone(), options.poll_interval)),
            tokio::spawn(run_visit_refetch(
                triggers.clone(),
                visit_receiver,
                options.visit_refetch_delay,
            )),
        ];
        if let Some(subscription) = realtime {
            tasks.push(tokio::spawn(run_realtime(triggers.clone(), subscription)));
        }
        if let Some(focus) = focus {
            tasks.push(tokio::spawn(run_focus(triggers.clone(), focus)));
        }

        let _ = triggers.send(SyncTrigger::SessionStart);
        tracing::debug!(
            poll_interval_ms = options.poll_interval.as_millis(),
            tasks = tasks.len(),
            "Sync session started"
        );

        Self {
            triggers,
            visits,
            tasks,
        }
    }

    /// Session whose refresh re-fetches through `actions`.
    ///
    /// A token is requested from `tokens` for every refresh, so a session
    /// outlives the access token it started with.
    pub fn for_actions<T: AccessTokenSource>(
        actions: BookmarkActions,
        tokens: Arc<T>,
        realtime: Option<ChangeSubscription>,
        focus: Option<FocusEvents>,
        options: SyncOptions,
    ) -> Self {
        let refresh = move || {
            let actions = actions.clone();
            let tokens = Arc::clone(&tokens);
            async move {
                let token = match tokens.access_token().await {
                    Ok(token) => token,
                    Err(error) => {
                        tracing::warn!(%error, "No usable access token for refresh");
                        actions
                            .store()
                            .dispatch(BookmarksAction::FetchFailed(error.to_string()));
                        return;
                    }
                };
                if let Err(error) = actions.fetch(Some(&token)).await {
                    tracing::debug!(%error, "Background refresh failed");
                }
            }
        };
        Self::start(refresh, realtime, focus, options)
    }

    /// Request a refresh directly.
    pub fn trigger(&self, trigger: SyncTrigger) -> bool {
        self.triggers.send(trigger).is_ok()
    }

    /// Refresh shortly after a visit so the updated count is picked up.
    pub fn schedule_visit_refetch(&self) -> bool {
        self.visits.send(()).is_ok()
    }

    /// Stop every trigger.
    pub fn shutdown(mut self) {
        self.abort_all();
        tracing::debug!("Sync session stopped");
    }

    fn abort_all(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.abort_all();
    }
}

async fn run_refresher<R, Fut>(
    refresh: Arc<R>,
    mut receiver: mpsc::UnboundedReceiver<SyncTrigger>,
    debounce: Duration,
) where
    R: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    while let Some(trigger) = receiver.recv().await {
        if !debounce.is_zero() {
            time::sleep(debounce).await;
        }
        let mut coalesced = 0_usize;
        while receiver.try_recv().is_ok() {
            coalesced += 1;
        }
        tracing::trace!(trigger = trigger.label(), coalesced, "Refreshing bookmarks");
        refresh().await;
    }
}

async fn run_poller(triggers: mpsc::UnboundedSender<SyncTrigger>, interval: Duration) {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if triggers.send(SyncTrigger::Poll).is_err() {
            break;
        }
    }
}

async fn run_realtime(
    triggers: mpsc::UnboundedSender<SyncTrigger>,
    mut subscription: ChangeSubscription,
) {
    while let Some(event) = subscription.next().await {
        tracing::trace!(kind = ?event.kind, "Realtime change received");
        if triggers.send(SyncTrigger::Realtime).is_err() {
            break;
        }
    }
}

async fn run_focus(triggers: mpsc::UnboundedSender<SyncTrigger>, mut focus: FocusEvents) {
    while focus.receiver.recv().await.is_some() {
        if triggers.send(SyncTrigger::Focus).is_err() {
            break;
        }
    }
}

async fn run_visit_refetch(
    triggers: mpsc::UnboundedSender<SyncTrigger>,
    mut visits: mpsc::UnboundedReceiver<()>,
    delay: Duration,
) {
    while visits.recv().await.is_some() {
        time::sleep(delay).await;
        if triggers.send(SyncTrigger::Visit).is_err() {
            break;
        }
    }
}
