//! Bookmark store client.
//!
//! Every call resolves to a [`StoreResponse`] carrying either data or an
//! error; nothing here returns `Err` or panics. Handlers decide what a
//! failure means for the HTTP response.

use std::future::Future;

use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use marks_core::models::VisitCount;
use marks_core::{Bookmark, BookmarkId, NewBookmark};
use marks_core::util::compact_text;

const BOOKMARK_COLUMNS: &str = "id,title,url,created_at,visit_count";
const VISIT_COLUMNS: &str = "id,visit_count";
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";
const RETURN_REPRESENTATION: &str = "return=representation";

/// PostgREST error body
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct StoreError {
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
            hint: None,
            code: None,
        }
    }

    fn transport(error: &reqwest::Error) -> Self {
        Self::new(error.to_string().replace('\n', " ").trim().to_string())
    }
}

/// Outcome of one store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreResponse<T> {
    pub data: Option<T>,
    pub error: Option<StoreError>,
}

impl<T> StoreResponse<T> {
    pub const fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    /// Success with no matching row
    pub const fn empty() -> Self {
        Self {
            data: None,
            error: None,
        }
    }

    pub const fn failed(error: StoreError) -> Self {
        Self {
            data: None,
            error: Some(error),
        }
    }

    /// The error if there is one, otherwise the (possibly absent) data.
    pub fn into_result(self) -> Result<Option<T>, StoreError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.data),
        }
    }
}

/// Row access for the `bookmarks` table, always scoped to one user.
pub trait BookmarkStore: Send + Sync + 'static {
    /// All of the user's bookmarks, newest first.
    fn select_bookmarks(
        &self,
        user_id: &str,
    ) -> impl Future<Output = StoreResponse<Vec<Bookmark>>> + Send;

    /// Current counter of exactly one bookmark; no row is an error.
    fn select_visit_count(
        &self,
        user_id: &str,
        id: &BookmarkId,
    ) -> impl Future<Output = StoreResponse<VisitCount>> + Send;

    /// Insert with `visit_count = 0` and return the stored row.
    fn insert_bookmark(
        &self,
        user_id: &str,
        bookmark: &NewBookmark,
    ) -> impl Future<Output = StoreResponse<Bookmark>> + Send;

    fn update_visit_count(
        &self,
        user_id: &str,
        id: &BookmarkId,
        visit_count: u64,
    ) -> impl Future<Output = StoreResponse<VisitCount>> + Send;

    /// Delete and return the id; `data` is `None` when nothing matched.
    fn delete_bookmark(
        &self,
        user_id: &str,
        id: &BookmarkId,
    ) -> impl Future<Output = StoreResponse<BookmarkId>> + Send;
}

/// Read the counter, then write it back plus one.
///
/// The read and the write are separate requests. Two concurrent calls can
/// both read the same value, so one increment is lost.
pub async fn increment_visit_count<S: BookmarkStore>(
    store: &S,
    user_id: &str,
    id: &BookmarkId,
) -> StoreResponse<VisitCount> {
    let current = match store.select_visit_count(user_id, id).await.into_result() {
        Ok(Some(current)) => current,
        Ok(None) => return StoreResponse::empty(),
        Err(error) => return StoreResponse::failed(error),
    };
    store
        .update_visit_count(user_id, id, current.visit_count.saturating_add(1))
        .await
}

/// [`BookmarkStore`] backed by Supabase's PostgREST endpoint.
#[derive(Clone)]
pub struct PostgrestStore {
    table_url: String,
    service_key: String,
    client: Client,
}

impl PostgrestStore {
    pub fn new(supabase_url: &str, service_key: impl Into<String>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            table_url: format!("{}/rest/v1/bookmarks", supabase_url.trim_end_matches('/')),
            service_key: service_key.into(),
            client: Client::builder().build()?,
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }
}

impl BookmarkStore for PostgrestStore {
    async fn select_bookmarks(&self, user_id: &str) -> StoreResponse<Vec<Bookmark>> {
        let request = self.authorized(self.client.get(&self.table_url)).query(&[
            ("select", BOOKMARK_COLUMNS.to_string()),
            ("user_id", eq(user_id)),
            ("order", "created_at.desc".to_string()),
        ]);
        execute(request).await
    }

    async fn select_visit_count(
        &self,
        user_id: &str,
        id: &BookmarkId,
    ) -> StoreResponse<VisitCount> {
        let request = self
            .authorized(self.client.get(&self.table_url))
            .header(ACCEPT, HeaderValue::from_static(SINGLE_OBJECT))
            .query(&[
                ("select", VISIT_COLUMNS.to_string()),
                ("id", eq(id.as_str())),
                ("user_id", eq(user_id)),
            ]);
        execute(request).await
    }

    async fn insert_bookmark(
        &self,
        user_id: &str,
        bookmark: &NewBookmark,
    ) -> StoreResponse<Bookmark> {
        let row = serde_json::json!([{
            "title": bookmark.title,
            "url": bookmark.url,
            "user_id": user_id,
            "visit_count": 0,
        }]);
        let request = self
            .authorized(self.client.post(&self.table_url))
            .header("Prefer", RETURN_REPRESENTATION)
            .header(ACCEPT, HeaderValue::from_static(SINGLE_OBJECT))
            .query(&[("select", BOOKMARK_COLUMNS)])
            .json(&row);
        execute(request).await
    }

    async fn update_visit_count(
        &self,
        user_id: &str,
        id: &BookmarkId,
        visit_count: u64,
    ) -> StoreResponse<VisitCount> {
        let request = self
            .authorized(self.client.patch(&self.table_url))
            .header("Prefer", RETURN_REPRESENTATION)
            .header(ACCEPT, HeaderValue::from_static(SINGLE_OBJECT))
            .query(&[
                ("select", VISIT_COLUMNS.to_string()),
                ("id", eq(id.as_str())),
                ("user_id", eq(user_id)),
            ])
            .json(&serde_json::json!({ "visit_count": visit_count }));
        execute(request).await
    }

    async fn delete_bookmark(&self, user_id: &str, id: &BookmarkId) -> StoreResponse<BookmarkId> {
        let request = self
            .authorized(self.client.delete(&self.table_url))
            .header("Prefer", RETURN_REPRESENTATION)
            .query(&[
                ("select", "id".to_string()),
                ("id", eq(id.as_str())),
                ("user_id", eq(user_id)),
            ]);
        match execute::<Vec<DeletedRow>>(request).await.into_result() {
            Ok(rows) => rows
                .and_then(|rows| rows.into_iter().next())
                .map_or_else(StoreResponse::empty, |row| StoreResponse::ok(row.id)),
            Err(error) => StoreResponse::failed(error),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DeletedRow {
    id: BookmarkId,
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

async fn execute<T: DeserializeOwned>(request: RequestBuilder) -> StoreResponse<T> {
    let response = match request.send().await {
        Ok(response) => response,
        Err(error) => return StoreResponse::failed(StoreError::transport(&error)),
    };

    let status = response.status();
    let body = match response.text().await {
        Ok(body) => body,
        Err(error) => return StoreResponse::failed(StoreError::transport(&error)),
    };

    if !status.is_success() {
        let error = serde_json::from_str::<StoreError>(&body).unwrap_or_else(|_| {
            StoreError::new(format!("HTTP {}: {}", status.as_u16(), compact_text(&body)))
        });
        return StoreResponse::failed(error);
    }

    match serde_json::from_str::<T>(&body) {
        Ok(data) => StoreResponse::ok(data),
        Err(error) => StoreResponse::failed(StoreError::new(format!(
            "Unexpected store response: {error}"
        ))),
    }
}
