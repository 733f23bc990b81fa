use std::future::Future;

use axum::http::HeaderMap;
use serde::Deserialize;

use crate::error::AppError;

pub const MISSING_TOKEN: &str = "Missing auth token";
pub const INVALID_TOKEN: &str = "Invalid auth token";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: String,
    pub email: Option<String>,
}

/// Resolves a bearer token to the user it belongs to.
pub trait IdentityProvider: Send + Sync + 'static {
    fn user_for_token(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<AuthenticatedUser, AppError>> + Send;
}

/// Asks Supabase GoTrue who a token belongs to.
///
/// There is no local verification or caching: every call is a round trip.
#[derive(Clone)]
pub struct SupabaseIdentityClient {
    user_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl SupabaseIdentityClient {
    pub fn new(supabase_url: &str, api_key: impl Into<String>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            user_url: format!("{}/auth/v1/user", supabase_url.trim_end_matches('/')),
            api_key: api_key.into(),
            client: reqwest::Client::builder().build()?,
        })
    }
}

impl IdentityProvider for SupabaseIdentityClient {
    async fn user_for_token(&self, token: &str) -> Result<AuthenticatedUser, AppError> {
        let response = self
            .client
            .get(&self.user_url)
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|error| {
                tracing::debug!(error = %sanitize(&error), "Identity request failed");
                AppError::unauthorized(INVALID_TOKEN)
            })?;

        if !response.status().is_success() {
            tracing::debug!(status = response.status().as_u16(), "Token rejected");
            return Err(AppError::unauthorized(INVALID_TOKEN));
        }

        let user = response.json::<GoTrueUser>().await.map_err(|error| {
            tracing::debug!(error = %sanitize(&error), "Identity response parse failed");
            AppError::unauthorized(INVALID_TOKEN)
        })?;
        if user.id.trim().is_empty() {
            return Err(AppError::unauthorized(INVALID_TOKEN));
        }

        Ok(AuthenticatedUser {
            id: user.id,
            email: user.email,
        })
    }
}

#[derive(Debug, Deserialize)]
struct GoTrueUser {
    id: String,
    email: Option<String>,
}

/// Token from `Authorization: Bearer <token>`.
///
/// Any missing or malformed header is reported the same way.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::unauthorized(MISSING_TOKEN))?;

    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| AppError::unauthorized(MISSING_TOKEN))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AppError::unauthorized(MISSING_TOKEN));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::unauthorized(MISSING_TOKEN));
    }

    Ok(token)
}

fn sanitize(error: &impl std::fmt::Display) -> String {
    error.to_string().replace('\n', " ").trim().to_string()
}

#[cfg(test)]
pub mod fixed {
    //! Token table for tests.

    use std::collections::HashMap;

    use super::*;

    #[derive(Default)]
    pub struct FixedIdentity {
        users: HashMap<String, AuthenticatedUser>,
    }

    impl FixedIdentity {
        #[must_use]
        pub fn with_user(mut self, token: &str, user_id: &str) -> Self {
            self.users.insert(
                token.to_string(),
                AuthenticatedUser {
                    id: user_id.to_string(),
                    email: Some(format!("{user_id}@example.com")),
                },
            );
            self
        }
    }

    impl IdentityProvider for FixedIdentity {
        async fn user_for_token(&self, token: &str) -> Result<AuthenticatedUser, AppError> {
            self.users
                .get(token)
                .cloned()
                .ok_or_else(|| AppError::unauthorized(INVALID_TOKEN))
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    async fn spawn_one_shot_server(
        status_line: &str,
        body: &str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test server");
        let address = listener.local_addr().expect("local address");
        let response = format!(
            "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            body.len(),
            body
        );

        let handle = tokio::spawn(async move {
            let mut request = String::new();
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut request_buffer = [0_u8; 4096];
                let read = socket.read(&mut request_buffer).await.unwrap_or(0);
                request = String::from_utf8_lossy(&request_buffer[..read]).to_string();
                let _ = socket.write_all(response.as_bytes()).await;
            }
            request
        });

        (format!("http://{address}"), handle)
    }

    #[test]
    fn bearer_token_extractor_accepts_standard_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );

        assert_eq!(extract_bearer_token(&headers).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn bearer_token_extractor_rejects_missing_or_malformed() {
        let headers = HeaderMap::new();
        let error = extract_bearer_token(&headers).unwrap_err();
        assert_eq!(error.to_string(), MISSING_TOKEN);

        for value in ["Basic abc", "Bearer", "Bearer   "] {
            let mut headers = HeaderMap::new();
            headers.insert("authorization", HeaderValue::from_static(value));
            assert!(extract_bearer_token(&headers).is_err(), "{value}");
        }
    }

    #[tokio::test]
    async fn supabase_identity_returns_user_for_valid_token() {
        let (url, server) = spawn_one_shot_server(
            "200 OK",
            r#"{"id":"user-1","email":"a@example.com","aud":"authenticated"}"#,
        )
        .await;
        let identity = SupabaseIdentityClient::new(&url, "anon-key").unwrap();

        let user = identity.user_for_token("token-1").await.unwrap();
        assert_eq!(user.id, "user-1");
        assert_eq!(user.email.as_deref(), Some("a@example.com"));

        let request = server.await.unwrap().to_ascii_lowercase();
        assert!(request.starts_with("get /auth/v1/user "));
        assert!(request.contains("apikey: anon-key"));
        assert!(request.contains("authorization: bearer token-1"));
    }

    #[tokio::test]
    async fn supabase_identity_rejection_is_invalid_token() {
        let (url, _server) = spawn_one_shot_server(
            "401 Unauthorized",
            r#"{"code":401,"msg":"invalid JWT"}"#,
        )
        .await;
        let identity = SupabaseIdentityClient::new(&url, "anon-key").unwrap();

        let error = identity.user_for_token("expired").await.unwrap_err();
        assert!(matches!(error, AppError::Unauthorized(ref message) if message == INVALID_TOKEN));
    }

    #[tokio::test]
    async fn supabase_identity_transport_failure_is_invalid_token() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);
        let identity = SupabaseIdentityClient::new(&format!("http://{address}"), "anon").unwrap();

        let error = identity.user_for_token("token").await.unwrap_err();
        assert_eq!(error.to_string(), INVALID_TOKEN);
    }
}
