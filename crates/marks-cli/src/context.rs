//! Everything a bookmark command needs, built once per invocation.

use std::sync::Arc;

use marks_core::actions::BookmarkActions;
use marks_core::api::BookmarksApi;
use marks_core::auth::{AccessTokenSource, AuthSession, SessionTokens};
use marks_core::config::ClientConfig;
use marks_core::state::StateStore;
use marks_core::sync::SupabaseRealtimeFeed;

use crate::auth::{auth_client, current_session, CliAuthClient, SessionStore};
use crate::error::CliError;

pub struct ClientContext {
    pub config: ClientConfig,
    pub session: Option<AuthSession>,
    pub actions: BookmarkActions,
    auth: Option<CliAuthClient>,
}

impl ClientContext {
    pub async fn load() -> Result<Self, CliError> {
        let config = ClientConfig::from_env()?;
        let session = current_session(&config).await?;
        Self::new(config, session)
    }

    pub fn new(config: ClientConfig, session: Option<AuthSession>) -> Result<Self, CliError> {
        let api = config
            .api_base_url
            .as_deref()
            .map(BookmarksApi::new)
            .transpose()?;
        if api.is_none() {
            tracing::debug!("MARKS_API_URL is not set; bookmark calls are disabled");
        }
        let auth = auth_client(&config)?;

        Ok(Self {
            config,
            session,
            actions: BookmarkActions::new(api, StateStore::new()),
            auth,
        })
    }

    pub fn token(&self) -> Option<&str> {
        self.session
            .as_ref()
            .map(|session| session.access_token.as_str())
    }

    pub fn require_session(&self) -> Result<&AuthSession, CliError> {
        self.session.as_ref().ok_or(CliError::NotSignedIn)
    }

    /// Access tokens for a long-running session, refreshed once they expire.
    pub fn session_tokens(&self) -> Result<Arc<SessionTokens<SessionStore>>, CliError> {
        let session = self.require_session()?.clone();
        Ok(Arc::new(SessionTokens::new(self.auth.clone(), session)))
    }

    /// Supabase Realtime feed, when a Supabase project is configured.
    pub fn realtime_feed<T: AccessTokenSource>(
        &self,
        tokens: &Arc<T>,
    ) -> Result<Option<SupabaseRealtimeFeed<T>>, CliError> {
        let Some(supabase) = self.config.supabase.as_ref() else {
            return Ok(None);
        };
        let feed =
            SupabaseRealtimeFeed::new(&supabase.url, &supabase.anon_key, Arc::clone(tokens))?;
        Ok(Some(feed))
    }

    pub fn store(&self) -> &StateStore {
        self.actions.store()
    }
}
