//! Supabase auth client used by the Marks front ends.
//!
//! Sessions come from the GoTrue password grant and are persisted through a
//! [`SessionPersistence`] implementation supplied by the caller.

use std::fmt;
use std::future::Future;
use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::util::{compact_text, is_http_url, normalize_text_option};

const EXPIRY_SKEW_SECONDS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
    /// `user_metadata.full_name`, falling back to `user_metadata.name`
    #[serde(default)]
    pub display_name: Option<String>,
}

impl AuthUser {
    /// Name to greet the user with: display name, then email, then id.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.id)
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
    pub user: AuthUser,
}

impl AuthSession {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= unix_timestamp_now() + EXPIRY_SKEW_SECONDS
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AuthSession")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Supabase auth is not configured. Set SUPABASE_URL and SUPABASE_ANON_KEY.")]
    NotConfigured,
    #[error("Invalid auth configuration: {0}")]
    InvalidConfiguration(&'static str),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to parse JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Auth API error: {0}")]
    Api(String),
    #[error("Secure storage error: {0}")]
    SecureStorage(String),
    #[error("Session expired. Run `marks auth login` again.")]
    SessionExpired,
}

pub type AuthResult<T> = Result<T, AuthError>;

pub trait SessionPersistence: Clone + Send + Sync + 'static {
    fn load_session(&self) -> AuthResult<Option<AuthSession>>;
    fn save_session(&self, session: &AuthSession) -> AuthResult<()>;
    fn clear_session(&self) -> AuthResult<()>;
}

#[derive(Clone)]
pub struct SupabaseAuthClient<S: SessionPersistence> {
    auth_url: String,
    anon_key: String,
    client: Client,
    store: S,
}

impl<S: SessionPersistence> SupabaseAuthClient<S> {
    pub fn new(url: impl AsRef<str>, anon_key: impl Into<String>, store: S) -> AuthResult<Self> {
        let auth_url = normalize_auth_url(url.as_ref())?;
        let anon_key = anon_key.into().trim().to_string();
        if anon_key.is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "Supabase anon key must not be empty",
            ));
        }

        Ok(Self {
            auth_url,
            anon_key,
            client: Client::builder().build()?,
            store,
        })
    }

    /// Stored session, refreshed first if it is about to expire.
    ///
    /// A session that can no longer be refreshed is cleared and `None` is
    /// returned, which the caller treats as signed out.
    pub async fn restore_session(&self) -> AuthResult<Option<AuthSession>> {
        let Some(stored_session) = self.store.load_session()? else {
            return Ok(None);
        };

        if !stored_session.is_expired() {
            return Ok(Some(stored_session));
        }

        match self.refresh_session(&stored_session.refresh_token).await {
            Ok(refreshed) => Ok(Some(refreshed)),
            Err(error) => {
                tracing::warn!("Failed to refresh persisted session: {}", error);
                self.store.clear_session()?;
                Ok(None)
            }
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<AuthSession> {
        validate_credentials(email, password)?;

        let payload = serde_json::json!({
            "email": email.trim(),
            "password": password,
        });
        let request = self.public_request(
            self.client
                .post(format!("{}/token", self.auth_url))
                .query(&[("grant_type", "password")])
                .json(&payload),
        );

        let response = self.send_auth_request(request).await?;
        let session = response.into_session()?.ok_or_else(|| {
            AuthError::Api("Sign-in response did not include an active session".to_string())
        })?;

        self.store.save_session(&session)?;
        tracing::debug!(expires_at = session.expires_at, "Signed in");
        Ok(session)
    }

    pub async fn refresh_session(&self, refresh_token: &str) -> AuthResult<AuthSession> {
        if refresh_token.trim().is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "Refresh token must not be empty",
            ));
        }

        let payload = serde_json::json!({
            "refresh_token": refresh_token,
        });
        let request = self.public_request(
            self.client
                .post(format!("{}/token", self.auth_url))
                .query(&[("grant_type", "refresh_token")])
                .json(&payload),
        );
        let response = self.send_auth_request(request).await?;
        let session = response.into_session()?.ok_or_else(|| {
            AuthError::Api("Refresh response did not include an active session".to_string())
        })?;

        self.store.save_session(&session)?;
        Ok(session)
    }

    /// Revoke the session remotely and forget it locally.
    ///
    /// An already-invalid token still counts as signed out.
    pub async fn sign_out(&self, access_token: &str) -> AuthResult<()> {
        let request = self
            .client
            .post(format!("{}/logout", self.auth_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token);

        let response = request.send().await?;
        if !(response.status().is_success() || response.status() == StatusCode::UNAUTHORIZED) {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Api(parse_api_error(status, &body)));
        }

        self.store.clear_session()?;
        Ok(())
    }

    fn public_request(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.anon_key))
    }

    async fn send_auth_request(&self, request: RequestBuilder) -> AuthResult<SupabaseAuthResponse> {
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Api(parse_api_error(status, &body)));
        }
        Ok(response.json::<SupabaseAuthResponse>().await?)
    }
}

/// Hands out a usable access token for each outgoing request.
pub trait AccessTokenSource: Send + Sync + 'static {
    fn access_token(&self) -> impl Future<Output = AuthResult<String>> + Send;
}

/// A fixed token that is never refreshed.
impl AccessTokenSource for String {
    async fn access_token(&self) -> AuthResult<String> {
        Ok(self.clone())
    }
}

/// Live session for a long-running client.
///
/// The access token is refreshed through the auth client shortly before it
/// expires; the refreshed session is persisted by the client's store.
pub struct SessionTokens<S: SessionPersistence> {
    client: Option<SupabaseAuthClient<S>>,
    session: Mutex<AuthSession>,
}

impl<S: SessionPersistence> SessionTokens<S> {
    /// Without a client an expired session cannot be renewed.
    pub fn new(client: Option<SupabaseAuthClient<S>>, session: AuthSession) -> Self {
        Self {
            client,
            session: Mutex::new(session),
        }
    }

    pub async fn session(&self) -> AuthSession {
        self.session.lock().await.clone()
    }
}

impl<S: SessionPersistence> AccessTokenSource for SessionTokens<S> {
    async fn access_token(&self) -> AuthResult<String> {
        let mut session = self.session.lock().await;
        if session.is_expired() {
            let client = self.client.as_ref().ok_or(AuthError::SessionExpired)?;
            let refreshed = client.refresh_session(&session.refresh_token).await?;
            tracing::debug!(expires_at = refreshed.expires_at, "Refreshed access token");
            *session = refreshed;
        }
        Ok(session.access_token.clone())
    }
}

pub fn normalize_auth_url(url: &str) -> AuthResult<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(AuthError::InvalidConfiguration(
            "Supabase URL must not be empty",
        ));
    }
    if !is_http_url(trimmed) {
        return Err(AuthError::InvalidConfiguration(
            "Supabase URL must include http:// or https://",
        ));
    }
    if trimmed.ends_with("/auth/v1") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{trimmed}/auth/v1"))
    }
}

/// Both values or neither; a half-configured pair is an error.
pub fn resolve_optional_supabase_config(
    url: Option<String>,
    anon_key: Option<String>,
) -> AuthResult<Option<(String, String)>> {
    let url = normalize_text_option(url);
    let anon_key = normalize_text_option(anon_key);

    match (url, anon_key) {
        (None, None) => Ok(None),
        (Some(url), Some(anon_key)) => Ok(Some((url, anon_key))),
        _ => Err(AuthError::NotConfigured),
    }
}

fn validate_credentials(email: &str, password: &str) -> AuthResult<()> {
    if email.trim().is_empty() {
        return Err(AuthError::Api("Email is required".to_string()));
    }
    if password.trim().is_empty() {
        return Err(AuthError::Api("Password is required".to_string()));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct SupabaseAuthResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
    expires_in: Option<i64>,
    user: Option<SupabaseUser>,
}

impl SupabaseAuthResponse {
    fn into_session(self) -> AuthResult<Option<AuthSession>> {
        let expires_at = self.expires_at.or_else(|| {
            self.expires_in
                .map(|expires_in| unix_timestamp_now().saturating_add(expires_in))
        });
        let user = self.user.map(Into::into);

        match (self.access_token, self.refresh_token, expires_at, user) {
            (Some(access_token), Some(refresh_token), Some(expires_at), Some(user)) => {
                Ok(Some(AuthSession {
                    access_token,
                    refresh_token,
                    expires_at,
                    user,
                }))
            }
            (None, None, None, Some(_)) => Ok(None),
            _ => Err(AuthError::Api(
                "Auth response did not include enough session fields".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SupabaseUser {
    id: String,
    email: Option<String>,
    #[serde(default)]
    user_metadata: Option<SupabaseUserMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct SupabaseUserMetadata {
    full_name: Option<String>,
    name: Option<String>,
}

impl From<SupabaseUser> for AuthUser {
    fn from(value: SupabaseUser) -> Self {
        let metadata = value.user_metadata.unwrap_or_default();
        let display_name = normalize_text_option(metadata.full_name)
            .or_else(|| normalize_text_option(metadata.name));
        Self {
            id: value.id,
            email: value.email,
            display_name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SupabaseErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
    message: Option<String>,
    msg: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<SupabaseErrorResponse>(body) {
        if let Some(message) = payload
            .message
            .or(payload.msg)
            .or(payload.error_description)
            .or(payload.error)
        {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn unix_timestamp_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| {
            i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
        })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    #[derive(Clone, Default)]
    struct MemoryPersistence {
        session: Arc<Mutex<Option<AuthSession>>>,
    }

    impl SessionPersistence for MemoryPersistence {
        fn load_session(&self) -> AuthResult<Option<AuthSession>> {
            Ok(self.session.lock().unwrap().clone())
        }

        fn save_session(&self, session: &AuthSession) -> AuthResult<()> {
            *self.session.lock().unwrap() = Some(session.clone());
            Ok(())
        }

        fn clear_session(&self) -> AuthResult<()> {
            *self.session.lock().unwrap() = None;
            Ok(())
        }
    }

    async fn spawn_one_shot_server(status_line: &str, body: &str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test server");
        let address = listener.local_addr().expect("local address");
        let response = format!(
            "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            body.len(),
            body
        );

        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut request_buffer = [0_u8; 4096];
                let _ = socket.read(&mut request_buffer).await;
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });

        format!("http://{address}")
    }

    fn session(expires_at: i64) -> AuthSession {
        AuthSession {
            access_token: "secret-access-token".to_string(),
            refresh_token: "secret-refresh-token".to_string(),
            expires_at,
            user: AuthUser {
                id: "user".to_string(),
                email: None,
                display_name: None,
            },
        }
    }

    #[test]
    fn normalize_auth_url_appends_auth_path() {
        let normalized = normalize_auth_url("https://demo.supabase.co/").unwrap();
        assert_eq!(normalized, "https://demo.supabase.co/auth/v1");
        let normalized = normalize_auth_url("https://demo.supabase.co/auth/v1").unwrap();
        assert_eq!(normalized, "https://demo.supabase.co/auth/v1");
        assert!(normalize_auth_url("demo.supabase.co").is_err());
    }

    #[test]
    fn half_configured_supabase_is_rejected() {
        assert!(resolve_optional_supabase_config(None, None).unwrap().is_none());
        assert!(matches!(
            resolve_optional_supabase_config(Some("https://demo.supabase.co".into()), None),
            Err(AuthError::NotConfigured)
        ));
    }

    #[test]
    fn session_debug_redacts_tokens() {
        let rendered = format!("{:?}", session(1_700_000_000));
        assert!(!rendered.contains("secret-access-token"));
        assert!(!rendered.contains("secret-refresh-token"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn display_name_prefers_full_name_then_name() {
        let user: AuthUser = serde_json::from_str::<SupabaseUser>(
            r#"{"id":"u1","email":"a@b.c","user_metadata":{"full_name":"Ada Lovelace","name":"ada"}}"#,
        )
        .unwrap()
        .into();
        assert_eq!(user.display_name.as_deref(), Some("Ada Lovelace"));

        let user: AuthUser = serde_json::from_str::<SupabaseUser>(
            r#"{"id":"u1","email":"a@b.c","user_metadata":{"full_name":" ","name":"ada"}}"#,
        )
        .unwrap()
        .into();
        assert_eq!(user.label(), "ada");

        let user: AuthUser =
            serde_json::from_str::<SupabaseUser>(r#"{"id":"u1","email":"a@b.c"}"#)
                .unwrap()
                .into();
        assert_eq!(user.display_name, None);
        assert_eq!(user.label(), "a@b.c");
    }

    #[test]
    fn api_error_prefers_message_fields() {
        let message = parse_api_error(
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
        );
        assert_eq!(message, "Invalid login credentials (400)");
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, ""), "HTTP 502");
    }

    #[tokio::test]
    async fn sign_in_persists_session() {
        let url = spawn_one_shot_server(
            "200 OK",
            r#"{"access_token":"access","refresh_token":"refresh","expires_in":3600,"user":{"id":"u1","email":"a@b.c","user_metadata":{"name":"Ada"}}}"#,
        )
        .await;
        let persistence = MemoryPersistence::default();
        let client = SupabaseAuthClient::new(url, "anon", persistence.clone()).unwrap();

        let session = client.sign_in("a@b.c", "hunter2").await.unwrap();
        assert_eq!(session.user.label(), "Ada");
        assert!(!session.is_expired());
        assert_eq!(persistence.load_session().unwrap(), Some(session));
    }

    #[tokio::test]
    async fn sign_in_rejects_blank_credentials_without_request() {
        let client =
            SupabaseAuthClient::new("http://127.0.0.1:9", "anon", MemoryPersistence::default())
                .unwrap();
        let error = client.sign_in(" ", "pw").await.unwrap_err();
        assert!(matches!(error, AuthError::Api(ref message) if message == "Email is required"));
    }

    #[tokio::test]
    async fn restore_returns_unexpired_session_without_network() {
        let persistence = MemoryPersistence::default();
        let stored = session(unix_timestamp_now() + 3_600);
        persistence.save_session(&stored).unwrap();
        let client =
            SupabaseAuthClient::new("http://127.0.0.1:9", "anon", persistence).unwrap();

        assert_eq!(client.restore_session().await.unwrap(), Some(stored));
    }

    #[tokio::test]
    async fn restore_clears_session_that_cannot_refresh() {
        let url = spawn_one_shot_server(
            "400 Bad Request",
            r#"{"error":"invalid_grant","error_description":"Refresh Token Not Found"}"#,
        )
        .await;
        let persistence = MemoryPersistence::default();
        persistence.save_session(&session(0)).unwrap();
        let client = SupabaseAuthClient::new(url, "anon", persistence.clone()).unwrap();

        assert_eq!(client.restore_session().await.unwrap(), None);
        assert_eq!(persistence.load_session().unwrap(), None);
    }

    #[tokio::test]
    async fn session_tokens_refresh_expired_session_once() {
        let url = spawn_one_shot_server(
            "200 OK",
            r#"{"access_token":"fresh-access","refresh_token":"fresh-refresh","expires_in":3600,"user":{"id":"user"}}"#,
        )
        .await;
        let persistence = MemoryPersistence::default();
        let client = SupabaseAuthClient::new(url, "anon", persistence.clone()).unwrap();
        let tokens = SessionTokens::new(Some(client), session(0));

        assert_eq!(tokens.access_token().await.unwrap(), "fresh-access");
        // The one-shot server is gone; a second refresh would fail.
        assert_eq!(tokens.access_token().await.unwrap(), "fresh-access");
        assert_eq!(tokens.session().await.refresh_token, "fresh-refresh");
        assert_eq!(
            persistence.load_session().unwrap().unwrap().access_token,
            "fresh-access"
        );
    }

    #[tokio::test]
    async fn session_tokens_keep_valid_token_without_network() {
        let tokens = SessionTokens::<MemoryPersistence>::new(
            None,
            session(unix_timestamp_now() + 3_600),
        );
        assert_eq!(tokens.access_token().await.unwrap(), "secret-access-token");
    }

    #[tokio::test]
    async fn session_tokens_without_client_report_expiry() {
        let tokens = SessionTokens::<MemoryPersistence>::new(None, session(0));
        assert!(matches!(
            tokens.access_token().await,
            Err(AuthError::SessionExpired)
        ));
    }

    #[tokio::test]
    async fn session_tokens_surface_refresh_rejection() {
        let url = spawn_one_shot_server(
            "400 Bad Request",
            r#"{"error":"invalid_grant","error_description":"Refresh Token Not Found"}"#,
        )
        .await;
        let client = SupabaseAuthClient::new(url, "anon", MemoryPersistence::default()).unwrap();
        let tokens = SessionTokens::new(Some(client), session(0));

        let error = tokens.access_token().await.unwrap_err();
        assert!(error.to_string().contains("Refresh Token Not Found"));
    }

    #[tokio::test]
    async fn sign_out_treats_unauthorized_as_signed_out() {
        let url = spawn_one_shot_server("401 Unauthorized", r#"{"msg":"invalid JWT"}"#).await;
        let persistence = MemoryPersistence::default();
        persistence.save_session(&session(0)).unwrap();
        let client = SupabaseAuthClient::new(url, "anon", persistence.clone()).unwrap();

        client.sign_out("expired").await.unwrap();
        assert_eq!(persistence.load_session().unwrap(), None);
    }
}
