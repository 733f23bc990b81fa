//! HTTP client for the Marks bookmarks API.

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{RequestBuilder, Response};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::models::{Bookmark, BookmarkId, NewBookmark, VisitCount};
use crate::util::{is_http_url, normalize_text_option};

pub const LOAD_FAILED: &str = "Failed to load bookmarks";
pub const ADD_FAILED: &str = "Failed to add bookmark";
pub const DELETE_FAILED: &str = "Failed to delete bookmark";
pub const VISIT_FAILED: &str = "Failed to track visit";

#[derive(Debug, Clone)]
pub struct BookmarksApi {
    base_url: String,
    client: reqwest::Client,
}

impl BookmarksApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        Ok(Self {
            base_url,
            client: reqwest::Client::builder().build()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn list(&self, token: &str) -> Result<Vec<Bookmark>> {
        let request = self.client.get(self.collection_url());
        let response = send(authorized(request, token), LOAD_FAILED).await?;
        Ok(response.json::<Vec<Bookmark>>().await?)
    }

    pub async fn create(&self, token: &str, bookmark: &NewBookmark) -> Result<Bookmark> {
        let request = self.client.post(self.collection_url()).json(bookmark);
        let response = send(authorized(request, token), ADD_FAILED).await?;
        Ok(response.json::<Bookmark>().await?)
    }

    pub async fn delete(&self, token: &str, id: &BookmarkId) -> Result<BookmarkId> {
        let request = self.client.delete(self.bookmark_url(id));
        let response = send(authorized(request, token), DELETE_FAILED).await?;
        let payload = response.json::<DeletedBookmark>().await?;
        Ok(payload.id)
    }

    pub async fn track_visit(&self, token: &str, id: &BookmarkId) -> Result<VisitCount> {
        let request = self
            .client
            .post(format!("{}/visit", self.bookmark_url(id)));
        let response = send(authorized(request, token), VISIT_FAILED).await?;
        let payload = response.json::<VisitResponse>().await?;
        Ok(payload.data)
    }

    fn collection_url(&self) -> String {
        format!("{}/api/bookmarks", self.base_url)
    }

    fn bookmark_url(&self, id: &BookmarkId) -> String {
        format!(
            "{}/api/bookmarks/{}",
            self.base_url,
            urlencoding::encode(id.as_str())
        )
    }
}

#[derive(Debug, Deserialize)]
struct DeletedBookmark {
    id: BookmarkId,
}

#[derive(Debug, Deserialize)]
struct VisitResponse {
    data: VisitCount,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

fn authorized(request: RequestBuilder, token: &str) -> RequestBuilder {
    request
        .bearer_auth(token)
        .header(CONTENT_TYPE, "application/json")
        .header(ACCEPT, "application/json")
}

async fn send(request: RequestBuilder, fallback: &str) -> Result<Response> {
    let response = request.send().await?;
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("application/json"));
    let message = match response.text().await {
        Ok(body) => message_from_body(&body, is_json, fallback),
        Err(_) => fallback.to_string(),
    };
    tracing::debug!(status, message = %message, "Bookmarks API request failed");
    Err(Error::Api(message))
}

/// User-facing message for a failed response body.
///
/// JSON bodies yield `message`, then `details`, then `hint`; other bodies
/// yield their text. Empty values fall through to `fallback`.
pub fn message_from_body(body: &str, is_json: bool, fallback: &str) -> String {
    if is_json {
        return serde_json::from_str::<ApiErrorBody>(body)
            .ok()
            .and_then(|payload| {
                [payload.message, payload.details, payload.hint]
                    .into_iter()
                    .flatten()
                    .find(|value| !value.is_empty())
            })
            .unwrap_or_else(|| fallback.to_string());
    }

    if body.is_empty() {
        fallback.to_string()
    } else {
        body.to_string()
    }
}

fn normalize_base_url(raw: String) -> Result<String> {
    let url = normalize_text_option(Some(raw)).ok_or_else(|| {
        Error::InvalidConfiguration("API base URL must not be empty".to_string())
    })?;
    if !is_http_url(&url) {
        return Err(Error::InvalidConfiguration(
            "API base URL must include http:// or https://".to_string(),
        ));
    }
    Ok(url.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    async fn spawn_one_shot_server(
        status_line: &str,
        content_type: &str,
        body: &str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test server");
        let address = listener.local_addr().expect("local address");
        let response = format!(
            "HTTP/1.1 {status_line}\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
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
    fn message_prefers_message_then_details_then_hint() {
        let body = r#"{"message":"","details":"row missing","hint":"check id"}"#;
        assert_eq!(message_from_body(body, true, "fallback"), "row missing");

        let body = r#"{"hint":"check id"}"#;
        assert_eq!(message_from_body(body, true, "fallback"), "check id");

        assert_eq!(message_from_body("{}", true, "fallback"), "fallback");
        assert_eq!(message_from_body("not json", true, "fallback"), "fallback");
    }

    #[test]
    fn message_uses_plain_text_or_fallback() {
        assert_eq!(message_from_body("Bad Gateway", false, "fallback"), "Bad Gateway");
        assert_eq!(message_from_body("", false, "fallback"), "fallback");
    }

    #[test]
    fn base_url_requires_http_scheme() {
        assert!(BookmarksApi::new("").is_err());
        assert!(BookmarksApi::new("api.example.com").is_err());
        let api = BookmarksApi::new(" https://api.example.com/ ").unwrap();
        assert_eq!(api.base_url(), "https://api.example.com");
    }

    #[tokio::test]
    async fn list_sends_bearer_token_and_parses_rows() {
        let body = r#"[{"id":"b1","title":"Rust","url":"https://rust-lang.org","created_at":"2024-05-01T00:00:00Z","visit_count":2}]"#;
        let (url, server) = spawn_one_shot_server("200 OK", "application/json", body).await;
        let api = BookmarksApi::new(url).unwrap();

        let items = api.list("token-123").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].visit_count, 2);

        let request = server.await.unwrap().to_ascii_lowercase();
        assert!(request.starts_with("get /api/bookmarks "));
        assert!(request.contains("authorization: bearer token-123"));
    }

    #[tokio::test]
    async fn delete_surfaces_not_found_message() {
        let (url, _server) = spawn_one_shot_server(
            "404 Not Found",
            "application/json; charset=utf-8",
            r#"{"message":"Bookmark not found"}"#,
        )
        .await;
        let api = BookmarksApi::new(url).unwrap();

        let error = api
            .delete("token", &BookmarkId::new("missing"))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Api(ref message) if message == "Bookmark not found"));
    }

    #[tokio::test]
    async fn track_visit_reads_nested_counter() {
        let (url, server) = spawn_one_shot_server(
            "200 OK",
            "application/json",
            r#"{"success":true,"data":{"id":"b1","visit_count":4}}"#,
        )
        .await;
        let api = BookmarksApi::new(url).unwrap();

        let visit = api.track_visit("token", &BookmarkId::new("b1")).await.unwrap();
        assert_eq!(visit.visit_count, 4);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/bookmarks/b1/visit "));
    }
}
