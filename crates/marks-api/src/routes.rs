use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use marks_core::models::VisitCount;
use marks_core::util::user_fingerprint;
use marks_core::{Bookmark, BookmarkId, NewBookmark};

use crate::auth::{
    extract_bearer_token, AuthenticatedUser, IdentityProvider, SupabaseIdentityClient,
};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::store::{increment_visit_count, BookmarkStore, PostgrestStore};

pub const TITLE_AND_URL_REQUIRED: &str = "Title and URL are required";
pub const BOOKMARK_NOT_FOUND: &str = "Bookmark not found";

pub struct AppState<S, I> {
    store: Arc<S>,
    identity: Arc<I>,
}

impl<S, I> Clone for AppState<S, I> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            identity: self.identity.clone(),
        }
    }
}

impl<S: BookmarkStore, I: IdentityProvider> AppState<S, I> {
    pub fn new(store: S, identity: I) -> Self {
        Self {
            store: Arc::new(store),
            identity: Arc::new(identity),
        }
    }
}

impl AppState<PostgrestStore, SupabaseIdentityClient> {
    pub fn from_config(config: &AppConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::new(
            PostgrestStore::new(&config.supabase_url, config.supabase_service_key.clone())?,
            SupabaseIdentityClient::new(&config.supabase_url, config.supabase_anon_key.clone())?,
        ))
    }
}

pub fn app_router<S: BookmarkStore, I: IdentityProvider>(state: AppState<S, I>) -> Router {
    let protected_routes = Router::new()
        .route(
            "/bookmarks",
            get(list_bookmarks::<S, I>).post(create_bookmark::<S, I>),
        )
        .route("/bookmarks/{id}", delete(delete_bookmark::<S, I>))
        .route("/bookmarks/{id}/visit", post(track_visit::<S, I>))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_auth::<S, I>,
        ))
        .method_not_allowed_fallback(not_found);

    Router::new()
        .route("/health", get(health))
        .method_not_allowed_fallback(not_found)
        .nest("/api", protected_routes)
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn not_found() -> AppError {
    AppError::not_found("Not found")
}

async fn require_auth<S: BookmarkStore, I: IdentityProvider>(
    State(state): State<AppState<S, I>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(request.headers())?;
    let user = state.identity.user_for_token(token).await?;
    tracing::debug!(
        user = user_fingerprint(&user.id),
        has_email = user.email.is_some(),
        "Authenticated request"
    );
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

async fn list_bookmarks<S: BookmarkStore, I: IdentityProvider>(
    State(state): State<AppState<S, I>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<Bookmark>>, AppError> {
    let items = state
        .store
        .select_bookmarks(&user.id)
        .await
        .into_result()?
        .unwrap_or_default();
    tracing::info!(
        endpoint = "list_bookmarks",
        user = user_fingerprint(&user.id),
        count = items.len(),
        "Listed bookmarks"
    );
    Ok(Json(items))
}

#[derive(Debug, Deserialize)]
struct CreateBookmarkRequest {
    title: Option<String>,
    url: Option<String>,
}

/// Blank, missing, or unparsable input is a single validation failure.
fn parse_create_body(body: &[u8]) -> Option<NewBookmark> {
    let request = serde_json::from_slice::<CreateBookmarkRequest>(body).ok()?;
    NewBookmark::parse(request.title.as_deref()?, request.url.as_deref()?)
}

async fn create_bookmark<S: BookmarkStore, I: IdentityProvider>(
    State(state): State<AppState<S, I>>,
    Extension(user): Extension<AuthenticatedUser>,
    body: Bytes,
) -> Result<Response, AppError> {
    let bookmark =
        parse_create_body(&body).ok_or_else(|| AppError::bad_request(TITLE_AND_URL_REQUIRED))?;

    let created = state
        .store
        .insert_bookmark(&user.id, &bookmark)
        .await
        .into_result()?
        .ok_or_else(|| AppError::internal("Failed to add bookmark"))?;
    tracing::info!(
        endpoint = "create_bookmark",
        user = user_fingerprint(&user.id),
        "Created bookmark"
    );
    Ok((StatusCode::CREATED, Json(created)).into_response())
}

#[derive(Debug, Serialize)]
struct DeletedBookmark {
    id: BookmarkId,
}

async fn delete_bookmark<S: BookmarkStore, I: IdentityProvider>(
    State(state): State<AppState<S, I>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<Json<DeletedBookmark>, AppError> {
    let id = BookmarkId::new(id);
    let deleted = state
        .store
        .delete_bookmark(&user.id, &id)
        .await
        .into_result()?
        .ok_or_else(|| AppError::not_found(BOOKMARK_NOT_FOUND))?;
    tracing::info!(
        endpoint = "delete_bookmark",
        user = user_fingerprint(&user.id),
        "Deleted bookmark"
    );
    Ok(Json(DeletedBookmark { id: deleted }))
}

#[derive(Debug, Serialize)]
struct VisitResponse {
    success: bool,
    data: VisitCount,
}

async fn track_visit<S: BookmarkStore, I: IdentityProvider>(
    State(state): State<AppState<S, I>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<Json<VisitResponse>, AppError> {
    let id = BookmarkId::new(id);
    let visit = increment_visit_count(state.store.as_ref(), &user.id, &id)
        .await
        .into_result()?
        .ok_or_else(|| AppError::internal("Failed to track visit"))?;
    tracing::debug!(
        endpoint = "track_visit",
        user = user_fingerprint(&user.id),
        visit_count = visit.visit_count,
        "Tracked visit"
    );
    Ok(Json(VisitResponse {
        success: true,
        data: visit,
    }))
}
