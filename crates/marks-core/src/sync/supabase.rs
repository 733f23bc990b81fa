//! Supabase Realtime change feed.
//!
//! Speaks the Phoenix channel protocol over the project's realtime websocket.
//! Each subscription joins one channel with a `postgres_changes` filter on the
//! user's bookmark rows and reconnects with backoff until it is dropped.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use url::Url;

use super::realtime::{ChangeEvent, ChangeFeed, ChangeKind, ChangeSubscription};
use crate::auth::{AccessTokenSource, AuthError};
use crate::models::BookmarkId;
use crate::util::{is_http_url, user_fingerprint};

const CHANNEL_TOPIC: &str = "realtime:bookmarks-changes";
const JOIN_REF: &str = "1";
const PROTOCOL_VERSION: &str = "1.0.0";
const BOOKMARKS_TABLE: &str = "bookmarks";
const FEED_CAPACITY: usize = 64;
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
const RECONNECT_DELAYS: [Duration; 4] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(5),
    Duration::from_secs(10),
];

#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("Invalid realtime configuration: {0}")]
    InvalidConfiguration(&'static str),
    #[error("Realtime socket error: {0}")]
    Socket(Box<tungstenite::Error>),
    #[error("Malformed realtime message: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("Realtime channel rejected the subscription: {0}")]
    Rejected(String),
}

impl From<tungstenite::Error> for RealtimeError {
    fn from(error: tungstenite::Error) -> Self {
        Self::Socket(Box::new(error))
    }
}

pub type RealtimeResult<T> = Result<T, RealtimeError>;

/// Websocket endpoint for a Supabase project URL.
fn realtime_socket_url(supabase_url: &str, anon_key: &str) -> RealtimeResult<String> {
    let trimmed = supabase_url.trim().trim_end_matches('/');
    if !is_http_url(trimmed) {
        return Err(RealtimeError::InvalidConfiguration(
            "Supabase URL must include http:// or https://",
        ));
    }
    let anon_key = anon_key.trim();
    if anon_key.is_empty() {
        return Err(RealtimeError::InvalidConfiguration(
            "Supabase anon key must not be empty",
        ));
    }

    let socket_base = trimmed.strip_prefix("https://").map_or_else(
        || trimmed.replacen("http://", "ws://", 1),
        |rest| format!("wss://{rest}"),
    );
    let mut url = Url::parse(&format!("{socket_base}/realtime/v1/websocket"))
        .map_err(|_| RealtimeError::InvalidConfiguration("Supabase URL is not a valid URL"))?;
    url.query_pairs_mut()
        .append_pair("apikey", anon_key)
        .append_pair("vsn", PROTOCOL_VERSION);
    Ok(url.to_string())
}

/// Row changes pushed by Supabase Realtime.
pub struct SupabaseRealtimeFeed<T: AccessTokenSource> {
    socket_url: String,
    tokens: Arc<T>,
}

impl<T: AccessTokenSource> SupabaseRealtimeFeed<T> {
    pub fn new(supabase_url: &str, anon_key: &str, tokens: Arc<T>) -> RealtimeResult<Self> {
        Ok(Self {
            socket_url: realtime_socket_url(supabase_url, anon_key)?,
            tokens,
        })
    }
}

impl<T: AccessTokenSource> ChangeFeed for SupabaseRealtimeFeed<T> {
    fn subscribe(&self, user_id: &str) -> ChangeSubscription {
        let (events, receiver) = broadcast::channel(FEED_CAPACITY);
        let connection = RealtimeConnection {
            socket_url: self.socket_url.clone(),
            tokens: Arc::clone(&self.tokens),
            user_id: user_id.to_string(),
            events,
            joins: 0,
        };
        ChangeSubscription::new(user_id, receiver).with_connection(tokio::spawn(connection.run()))
    }
}

struct RealtimeConnection<T> {
    socket_url: String,
    tokens: Arc<T>,
    user_id: String,
    events: broadcast::Sender<ChangeEvent>,
    joins: usize,
}

impl<T: AccessTokenSource> RealtimeConnection<T> {
    async fn run(mut self) {
        let mut failures = 0_usize;
        loop {
            let joins_before = self.joins;
            match self.stream_changes().await {
                Ok(()) => tracing::debug!("Realtime socket closed"),
                Err(error) => tracing::warn!(%error, "Realtime connection failed"),
            }
            if self.joins > joins_before {
                failures = 0;
            }
            let delay = RECONNECT_DELAYS[failures.min(RECONNECT_DELAYS.len() - 1)];
            failures += 1;
            time::sleep(delay).await;
        }
    }

    async fn stream_changes(&mut self) -> RealtimeResult<()> {
        let mut access_token = self.tokens.access_token().await?;
        let (socket, _) = connect_async(self.socket_url.as_str()).await?;
        let (mut sink, mut stream) = socket.split();
        sink.send(Message::text(
            join_message(&self.user_id, &access_token).to_string(),
        ))
        .await?;

        let mut heartbeat =
            time::interval_at(Instant::now() + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut next_ref = 1_u64;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    next_ref += 1;
                    sink.send(Message::text(heartbeat_message(next_ref).to_string())).await?;

                    let current = self.tokens.access_token().await?;
                    if current != access_token {
                        next_ref += 1;
                        sink.send(Message::text(
                            access_token_message(&current, next_ref).to_string(),
                        ))
                        .await?;
                        access_token = current;
                    }
                }
                message = stream.next() => {
                    let Some(message) = message else {
                        return Ok(());
                    };
                    let text = match message? {
                        Message::Text(text) => text,
                        Message::Close(_) => return Ok(()),
                        _ => continue,
                    };
                    let frame = match parse_frame(&text) {
                        Ok(frame) => frame,
                        Err(error) => {
                            tracing::debug!(%error, "Ignoring realtime message");
                            continue;
                        }
                    };
                    match frame {
                        Frame::Joined => {
                            self.joins += 1;
                            tracing::debug!(
                                user = user_fingerprint(&self.user_id),
                                "Joined realtime channel"
                            );
                            // Changes made while disconnected were never delivered
                            if self.joins > 1 {
                                self.publish(ChangeKind::Resync, None);
                            }
                        }
                        Frame::Change(kind, bookmark_id) => self.publish(kind, bookmark_id),
                        Frame::Rejected(reason) => return Err(RealtimeError::Rejected(reason)),
                        Frame::Closed => return Ok(()),
                        Frame::Ignored => {}
                    }
                }
            }
        }
    }

    fn publish(&self, kind: ChangeKind, bookmark_id: Option<BookmarkId>) {
        let _ = self.events.send(ChangeEvent {
            user_id: self.user_id.clone(),
            kind,
            bookmark_id,
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Frame {
    Joined,
    Rejected(String),
    Change(ChangeKind, Option<BookmarkId>),
    Closed,
    Ignored,
}

#[derive(Debug, Deserialize)]
struct PhoenixMessage {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
}

fn parse_frame(text: &str) -> RealtimeResult<Frame> {
    let message: PhoenixMessage = serde_json::from_str(text)?;
    if message.topic != CHANNEL_TOPIC {
        return Ok(Frame::Ignored);
    }

    let payload = &message.payload;
    let frame = match message.event.as_str() {
        "phx_reply" if message.reference.as_deref() == Some(JOIN_REF) => {
            if payload["status"] == "ok" {
                Frame::Joined
            } else {
                Frame::Rejected(
                    payload["response"]["reason"]
                        .as_str()
                        .or_else(|| payload["status"].as_str())
                        .unwrap_or("no reason given")
                        .to_string(),
                )
            }
        }
        "postgres_changes" => change_frame(&payload["data"]),
        "system" if payload["status"] == "error" => Frame::Rejected(
            payload["message"]
                .as_str()
                .unwrap_or("postgres_changes subscription failed")
                .to_string(),
        ),
        "phx_error" | "phx_close" => Frame::Closed,
        _ => Frame::Ignored,
    };
    Ok(frame)
}

fn change_frame(data: &Value) -> Frame {
    let kind = match data["type"].as_str().or_else(|| data["eventType"].as_str()) {
        Some("INSERT") => ChangeKind::Insert,
        Some("UPDATE") => ChangeKind::Update,
        Some("DELETE") => ChangeKind::Delete,
        _ => ChangeKind::Resync,
    };
    let bookmark_id = ["record", "old_record", "new", "old"]
        .iter()
        .find_map(|key| row_id(&data[*key]));
    Frame::Change(kind, bookmark_id)
}

fn row_id(row: &Value) -> Option<BookmarkId> {
    match &row["id"] {
        Value::String(id) => Some(BookmarkId::new(id.as_str())),
        Value::Number(id) => Some(BookmarkId::new(id.to_string())),
        _ => None,
    }
}

fn join_message(user_id: &str, access_token: &str) -> Value {
    json!({
        "topic": CHANNEL_TOPIC,
        "event": "phx_join",
        "ref": JOIN_REF,
        "join_ref": JOIN_REF,
        "payload": {
            "config": {
                "broadcast": {"ack": false, "self": false},
                "presence": {"key": ""},
                "postgres_changes": [{
                    "event": "*",
                    "schema": "public",
                    "table": BOOKMARKS_TABLE,
                    "filter": format!("user_id=eq.{user_id}"),
                }],
                "private": false,
            },
            "access_token": access_token,
        },
    })
}

fn heartbeat_message(reference: u64) -> Value {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": reference.to_string(),
    })
}

fn access_token_message(access_token: &str, reference: u64) -> Value {
    json!({
        "topic": CHANNEL_TOPIC,
        "event": "access_token",
        "payload": {"access_token": access_token},
        "ref": reference.to_string(),
        "join_ref": JOIN_REF,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;
    use tokio_tungstenite::accept_hdr_async;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    use super::*;
    use crate::sync::{SyncOptions, SyncSession};

    /// Accepts one socket, answers the join, then pushes `frames` once released.
    async fn spawn_realtime_server(
        frames: Vec<Value>,
        release: oneshot::Receiver<()>,
    ) -> (String, JoinHandle<(String, Value)>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut request_uri = String::new();
            let capture_uri =
                |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                    request_uri = request.uri().to_string();
                    Ok(response)
                };
            let mut socket = accept_hdr_async(stream, capture_uri).await.unwrap();

            let join = loop {
                if let Message::Text(text) = socket.next().await.unwrap().unwrap() {
                    break serde_json::from_str::<Value>(&text).unwrap();
                }
            };
            let reply = json!({
                "topic": CHANNEL_TOPIC,
                "event": "phx_reply",
                "ref": JOIN_REF,
                "payload": {"status": "ok", "response": {"postgres_changes": []}},
            });
            socket.send(Message::text(reply.to_string())).await.unwrap();

            let _ = release.await;
            for frame in frames {
                socket.send(Message::text(frame.to_string())).await.unwrap();
            }
            while let Some(Ok(_)) = socket.next().await {}
            (request_uri, join)
        });

        (format!("http://{address}"), server)
    }

    fn change(kind: &str, record: Value, old_record: Value) -> Value {
        json!({
            "topic": CHANNEL_TOPIC,
            "event": "postgres_changes",
            "ref": null,
            "payload": {
                "ids": [1],
                "data": {
                    "schema": "public",
                    "table": "bookmarks",
                    "type": kind,
                    "record": record,
                    "old_record": old_record,
                },
            },
        })
    }

    #[test]
    fn socket_url_switches_scheme_and_carries_key() {
        assert_eq!(
            realtime_socket_url("https://demo.supabase.co/", "anon").unwrap(),
            "wss://demo.supabase.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );
        assert_eq!(
            realtime_socket_url("http://127.0.0.1:54321", "anon").unwrap(),
            "ws://127.0.0.1:54321/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );
        assert!(realtime_socket_url("demo.supabase.co", "anon").is_err());
        assert!(realtime_socket_url("https://demo.supabase.co", " ").is_err());
    }

    #[test]
    fn join_message_filters_to_user_rows() {
        let join = join_message("user-1", "jwt");
        assert_eq!(join["event"], "phx_join");
        assert_eq!(join["payload"]["access_token"], "jwt");
        assert_eq!(
            join["payload"]["config"]["postgres_changes"][0],
            json!({
                "event": "*",
                "schema": "public",
                "table": "bookmarks",
                "filter": "user_id=eq.user-1",
            })
        );
    }

    #[test]
    fn frames_are_classified() {
        let joined = json!({
            "topic": CHANNEL_TOPIC,
            "event": "phx_reply",
            "ref": "1",
            "payload": {"status": "ok"},
        });
        assert_eq!(parse_frame(&joined.to_string()).unwrap(), Frame::Joined);

        let rejected = json!({
            "topic": CHANNEL_TOPIC,
            "event": "phx_reply",
            "ref": "1",
            "payload": {"status": "error", "response": {"reason": "unauthorized"}},
        });
        assert_eq!(
            parse_frame(&rejected.to_string()).unwrap(),
            Frame::Rejected("unauthorized".to_string())
        );

        let system_error = json!({
            "topic": CHANNEL_TOPIC,
            "event": "system",
            "payload": {"status": "error", "message": "table not in publication"},
        });
        assert_eq!(
            parse_frame(&system_error.to_string()).unwrap(),
            Frame::Rejected("table not in publication".to_string())
        );

        let heartbeat_reply = json!({
            "topic": "phoenix",
            "event": "phx_reply",
            "ref": "1",
            "payload": {"status": "ok"},
        });
        assert_eq!(parse_frame(&heartbeat_reply.to_string()).unwrap(), Frame::Ignored);

        let closed = json!({"topic": CHANNEL_TOPIC, "event": "phx_close", "payload": {}});
        assert_eq!(parse_frame(&closed.to_string()).unwrap(), Frame::Closed);

        assert!(parse_frame("not json").is_err());
    }

    #[test]
    fn change_frames_carry_kind_and_row_id() {
        let insert = change("INSERT", json!({"id": 7, "title": "Rust"}), json!({}));
        assert_eq!(
            parse_frame(&insert.to_string()).unwrap(),
            Frame::Change(ChangeKind::Insert, Some(BookmarkId::new("7")))
        );

        let delete = change("DELETE", json!({}), json!({"id": "b2"}));
        assert_eq!(
            parse_frame(&delete.to_string()).unwrap(),
            Frame::Change(ChangeKind::Delete, Some(BookmarkId::new("b2")))
        );

        let unknown = change("TRUNCATE", json!({}), json!({}));
        assert_eq!(
            parse_frame(&unknown.to_string()).unwrap(),
            Frame::Change(ChangeKind::Resync, None)
        );
    }

    #[tokio::test]
    async fn feed_joins_user_channel_and_forwards_pushed_changes() {
        let (release, released) = oneshot::channel();
        let (url, server) = spawn_realtime_server(
            vec![
                change("INSERT", json!({"id": 7, "user_id": "user-1"}), json!({})),
                change("DELETE", json!({}), json!({"id": "b2"})),
            ],
            released,
        )
        .await;
        let tokens = Arc::new("user-token".to_string());
        let feed = SupabaseRealtimeFeed::new(&url, "anon-key", tokens).unwrap();
        let mut subscription = feed.subscribe("user-1");
        release.send(()).unwrap();

        let first = timeout(Duration::from_secs(5), subscription.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            first,
            ChangeEvent {
                user_id: "user-1".to_string(),
                kind: ChangeKind::Insert,
                bookmark_id: Some(BookmarkId::new("7")),
            }
        );
        let second = timeout(Duration::from_secs(5), subscription.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.kind, ChangeKind::Delete);
        assert_eq!(second.bookmark_id, Some(BookmarkId::new("b2")));

        drop(subscription);
        let (request_uri, join) = timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            request_uri,
            "/realtime/v1/websocket?apikey=anon-key&vsn=1.0.0"
        );
        assert_eq!(join["topic"], CHANNEL_TOPIC);
        assert_eq!(join["payload"]["access_token"], "user-token");
        assert_eq!(
            join["payload"]["config"]["postgres_changes"][0]["filter"],
            "user_id=eq.user-1"
        );
    }

    #[tokio::test]
    async fn pushed_change_triggers_a_sync_refresh() {
        let (release, released) = oneshot::channel();
        let (url, _server) = spawn_realtime_server(
            vec![change("INSERT", json!({"id": "b9"}), json!({}))],
            released,
        )
        .await;
        let tokens = Arc::new("user-token".to_string());
        let feed = SupabaseRealtimeFeed::new(&url, "anon-key", tokens).unwrap();

        let refreshes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&refreshes);
        let session = SyncSession::start(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                std::future::ready(())
            },
            Some(feed.subscribe("user-1")),
            None,
            SyncOptions {
                poll_interval: Duration::from_secs(3_600),
                debounce: Duration::ZERO,
                visit_refetch_delay: Duration::from_millis(500),
            },
        );

        let wait_for = |expected: usize| {
            let refreshes = Arc::clone(&refreshes);
            timeout(Duration::from_secs(5), async move {
                while refreshes.load(Ordering::SeqCst) < expected {
                    time::sleep(Duration::from_millis(10)).await;
                }
            })
        };

        wait_for(1).await.unwrap();
        release.send(()).unwrap();
        wait_for(2).await.unwrap();
        assert_eq!(refreshes.load(Ordering::SeqCst), 2);

        session.shutdown();
    }
}
