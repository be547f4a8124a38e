//! Shared fakes for integration tests: a downstream notifier and a Kafka REST proxy.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use kafka_bridge::{DownstreamTarget, Message};

/// Serve `app` on an ephemeral local port.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// An address nothing is listening on.
pub fn closed_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// Credential the fake notifier's target is configured with.
pub const NOTIFIER_AUTH: &str = "Basic bm90aWZpZXI=";

pub fn url(addr: SocketAddr) -> String {
    format!("http://{}", addr)
}

/// Client that ignores any proxy configured in the environment.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

/// Poll `cond` until it holds or `within` elapses.
pub async fn wait_for<F: Fn() -> bool>(cond: F, within: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

pub fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn publish_message(tid: &str, origin: &str, body: &str) -> Message {
    Message::new(
        headers(&[
            ("Message-Type", "cms-content-published"),
            ("Content-Type", "application/json"),
            ("X-Request-Id", tid),
            ("Origin-System-Id", origin),
        ]),
        body,
    )
}

/// Text frame as the proxy stores it.
pub fn frame(tid: &str, origin: &str, body: &str) -> String {
    format!(
        "FTMSG/1.0\r\nMessage-Type: cms-content-published\r\nOrigin-System-Id: {}\r\nX-Request-Id: {}\r\n\r\n{}",
        origin, tid, body
    )
}

// =============================================================================
// Downstream notifier
// =============================================================================

/// One request seen by the fake notifier.
#[derive(Debug, Clone)]
pub struct Captured {
    pub path: String,
    pub host: Option<String>,
    pub tid: Option<String>,
    pub origin: Option<String>,
    pub authorization: Option<String>,
    pub body: String,
}

type StatusFn = Arc<dyn Fn(usize) -> u16 + Send + Sync>;

#[derive(Clone)]
struct NotifierState {
    notify_status: StatusFn,
    health_status: u16,
    delay: Duration,
    health_delay: Duration,
    notifies: Arc<AtomicUsize>,
    captured: Arc<Mutex<Vec<Captured>>>,
}

pub struct FakeNotifier {
    pub addr: SocketAddr,
    captured: Arc<Mutex<Vec<Captured>>>,
}

impl FakeNotifier {
    pub fn target(&self) -> DownstreamTarget {
        DownstreamTarget {
            addr: url(self.addr),
            host: "cms-notifier".to_string(),
            endpoint: "/notify".to_string(),
            authorization: Some(NOTIFIER_AUTH.to_string()),
        }
    }

    pub fn captured(&self) -> Vec<Captured> {
        self.captured.lock().unwrap().clone()
    }

    pub fn notifications(&self) -> Vec<Captured> {
        self.captured()
            .into_iter()
            .filter(|c| c.path == "/notify")
            .collect()
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

fn capture(state: &NotifierState, path: &str, headers: &HeaderMap, body: String) {
    state.captured.lock().unwrap().push(Captured {
        path: path.to_string(),
        host: header(headers, "host"),
        tid: header(headers, "x-request-id"),
        origin: header(headers, "x-origin-system-id"),
        authorization: header(headers, "authorization"),
        body,
    });
}

async fn notify(State(state): State<NotifierState>, headers: HeaderMap, body: String) -> StatusCode {
    let n = state.notifies.fetch_add(1, Ordering::SeqCst);
    capture(&state, "/notify", &headers, body);
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }
    StatusCode::from_u16((state.notify_status)(n)).unwrap()
}

async fn notifier_health(State(state): State<NotifierState>, headers: HeaderMap) -> StatusCode {
    capture(&state, "/__health", &headers, String::new());
    if !state.health_delay.is_zero() {
        tokio::time::sleep(state.health_delay).await;
    }
    StatusCode::from_u16(state.health_status).unwrap()
}

/// Notifier whose `/notify` status depends on the request's sequence number.
pub async fn start_notifier_with(
    notify_status: impl Fn(usize) -> u16 + Send + Sync + 'static,
    health_status: u16,
    delay: Duration,
) -> FakeNotifier {
    start_notifier_delayed(notify_status, health_status, delay, Duration::ZERO).await
}

/// Notifier that also holds `/__health` answers for `health_delay`.
pub async fn start_notifier_delayed(
    notify_status: impl Fn(usize) -> u16 + Send + Sync + 'static,
    health_status: u16,
    delay: Duration,
    health_delay: Duration,
) -> FakeNotifier {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let state = NotifierState {
        notify_status: Arc::new(notify_status),
        health_status,
        delay,
        health_delay,
        notifies: Arc::new(AtomicUsize::new(0)),
        captured: Arc::clone(&captured),
    };
    let app = Router::new()
        .route("/notify", post(notify))
        .route("/__health", get(notifier_health))
        .with_state(state);

    FakeNotifier {
        addr: serve(app).await,
        captured,
    }
}

pub async fn start_notifier(notify_status: u16, health_status: u16) -> FakeNotifier {
    start_notifier_with(move |_| notify_status, health_status, Duration::ZERO).await
}

// =============================================================================
// Kafka REST proxy
// =============================================================================

#[derive(Clone)]
struct ProxyState {
    topics: Vec<String>,
    topics_status: u16,
    batches: Arc<Mutex<VecDeque<Vec<String>>>>,
    failing_fetches: Arc<AtomicUsize>,
    created: Arc<AtomicUsize>,
    deleted: Arc<AtomicUsize>,
    fetches: Arc<AtomicUsize>,
    commits: Arc<AtomicUsize>,
    authorizations: Arc<Mutex<Vec<Option<String>>>>,
    create_bodies: Arc<Mutex<Vec<Value>>>,
}

pub struct FakeProxy {
    pub addr: SocketAddr,
    state: ProxyState,
}

impl FakeProxy {
    /// Queue a batch of text frames for the next fetch.
    pub fn push_batch(&self, frames: Vec<String>) {
        self.state.batches.lock().unwrap().push_back(frames);
    }

    /// Make the next `n` fetches answer 500.
    pub fn fail_fetches(&self, n: usize) {
        self.state.failing_fetches.store(n, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.state.created.load(Ordering::SeqCst)
    }

    pub fn deleted(&self) -> usize {
        self.state.deleted.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.state.fetches.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.state.commits.load(Ordering::SeqCst)
    }

    pub fn authorizations(&self) -> Vec<Option<String>> {
        self.state.authorizations.lock().unwrap().clone()
    }

    pub fn create_bodies(&self) -> Vec<Value> {
        self.state.create_bodies.lock().unwrap().clone()
    }
}

async fn list_topics(State(state): State<ProxyState>, headers: HeaderMap) -> (StatusCode, Json<Vec<String>>) {
    state
        .authorizations
        .lock()
        .unwrap()
        .push(header(&headers, "authorization"));
    (
        StatusCode::from_u16(state.topics_status).unwrap(),
        Json(state.topics.clone()),
    )
}

async fn create_consumer(
    State(state): State<ProxyState>,
    Path(group): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    state
        .authorizations
        .lock()
        .unwrap()
        .push(header(&headers, "authorization"));
    state.create_bodies.lock().unwrap().push(body);

    let n = state.created.fetch_add(1, Ordering::SeqCst);
    let id = format!("bridge-{}", n);
    Json(json!({
        "instance_id": id,
        "base_uri": format!("http://kafka-rest-proxy.internal/consumers/{}/instances/{}", group, id),
    }))
}

async fn fetch_records(
    State(state): State<ProxyState>,
    Path((_group, _id, _topic)): Path<(String, String, String)>,
) -> (StatusCode, Json<Value>) {
    state.fetches.fetch_add(1, Ordering::SeqCst);

    let failing = state.failing_fetches.load(Ordering::SeqCst);
    if failing > 0 {
        state.failing_fetches.store(failing - 1, Ordering::SeqCst);
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error_code": 500})));
    }

    let frames = state.batches.lock().unwrap().pop_front().unwrap_or_default();
    let records: Vec<Value> = frames
        .iter()
        .enumerate()
        .map(|(i, f)| json!({"value": BASE64.encode(f), "partition": 0, "offset": i}))
        .collect();
    (StatusCode::OK, Json(Value::Array(records)))
}

async fn commit_offsets(
    State(state): State<ProxyState>,
    Path((_group, _id)): Path<(String, String)>,
) -> StatusCode {
    state.commits.fetch_add(1, Ordering::SeqCst);
    StatusCode::OK
}

async fn delete_consumer(
    State(state): State<ProxyState>,
    Path((_group, _id)): Path<(String, String)>,
) -> StatusCode {
    state.deleted.fetch_add(1, Ordering::SeqCst);
    StatusCode::NO_CONTENT
}

pub async fn start_proxy(topics: &[&str], topics_status: u16) -> FakeProxy {
    let state = ProxyState {
        topics: topics.iter().map(|t| t.to_string()).collect(),
        topics_status,
        batches: Arc::new(Mutex::new(VecDeque::new())),
        failing_fetches: Arc::new(AtomicUsize::new(0)),
        created: Arc::new(AtomicUsize::new(0)),
        deleted: Arc::new(AtomicUsize::new(0)),
        fetches: Arc::new(AtomicUsize::new(0)),
        commits: Arc::new(AtomicUsize::new(0)),
        authorizations: Arc::new(Mutex::new(Vec::new())),
        create_bodies: Arc::new(Mutex::new(Vec::new())),
    };

    let app = Router::new()
        .route("/topics", get(list_topics))
        .route("/consumers/:group", post(create_consumer))
        .route("/consumers/:group/instances/:id/topics/:topic", get(fetch_records))
        .route("/consumers/:group/instances/:id/offsets", post(commit_offsets))
        .route("/consumers/:group/instances/:id", delete(delete_consumer))
        .with_state(state.clone());

    FakeProxy {
        addr: serve(app).await,
        state,
    }
}
