//! Exposes an in-process S3-like object server for use in integration tests.
//!
//! The server speaks just enough of the S3 object API for the benchmark: `HEAD` to resolve object
//! sizes, `GET` with a `Range` header to read ranges, and `PUT` to upload result files. Objects
//! are addressed path-style as `/{bucket}/{key}`.
//!
//! ```
//! use rangebench_test::server::RangeServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = RangeServer::new().await;
//!    server.insert_random("bench", "large.bin", 1024);
//!    let endpoint = server.endpoint();
//!    // point the storage client at the endpoint...
//! }
//! ```

use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};

#[derive(Debug, Default)]
struct ServerState {
    objects: Mutex<HashMap<String, Bytes>>,
    range_reads: AtomicU64,
    fail_status: Mutex<Option<StatusCode>>,
    ignore_ranges: AtomicBool,
    authorization: Mutex<Option<String>>,
}

impl ServerState {
    fn record_auth(&self, headers: &HeaderMap) {
        let auth = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        *self.authorization.lock().unwrap() = auth;
    }

    fn lookup(&self, bucket: &str, key: &str) -> Option<Bytes> {
        let objects = self.objects.lock().unwrap();
        objects.get(&format!("{bucket}/{key}")).cloned()
    }
}

/// An in-process object server for use in integration tests.
///
/// It listens on a random available port on localhost. Objects are kept in memory and are gone
/// once the server is dropped.
#[derive(Debug)]
pub struct RangeServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    state: Arc<ServerState>,
}

impl RangeServer {
    pub async fn new() -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let state = Arc::new(ServerState::default());
        let app = Router::new()
            .route(
                "/{bucket}/{*key}",
                get(get_object).head(head_object).put(put_object),
            )
            .with_state(state.clone());

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            handle,
            socket,
            state,
        }
    }

    /// Stores an object of `size` deterministic random bytes and returns its contents.
    pub fn insert_random(&self, bucket: &str, key: &str, size: usize) -> Bytes {
        let mut contents = vec![0; size];
        SmallRng::seed_from_u64(size as u64).fill_bytes(&mut contents);
        let contents = Bytes::from(contents);

        let mut objects = self.state.objects.lock().unwrap();
        objects.insert(format!("{bucket}/{key}"), contents.clone());
        contents
    }

    /// Returns the contents of a stored or uploaded object.
    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.state.lookup(bucket, key)
    }

    /// Returns the sorted keys of all objects in a bucket.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let prefix = format!("{bucket}/");
        let objects = self.state.objects.lock().unwrap();
        let mut keys: Vec<_> = objects
            .keys()
            .filter_map(|path| path.strip_prefix(&prefix))
            .map(str::to_owned)
            .collect();
        keys.sort();
        keys
    }

    /// Answers every subsequent `GET` with the given status code.
    pub fn fail_reads(&self, status: u16) {
        let status = StatusCode::from_u16(status).unwrap();
        *self.state.fail_status.lock().unwrap() = Some(status);
    }

    /// Ignores `Range` headers and answers with the full object, like a non-compliant endpoint.
    pub fn ignore_ranges(&self) {
        self.state.ignore_ranges.store(true, Ordering::Relaxed);
    }

    /// Number of `GET` requests received so far.
    pub fn range_reads(&self) -> u64 {
        self.state.range_reads.load(Ordering::Relaxed)
    }

    /// The `Authorization` header of the most recent request, if any.
    pub fn last_authorization(&self) -> Option<String> {
        self.state.authorization.lock().unwrap().clone()
    }

    /// Returns the base URL of the server, to be used as storage endpoint.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn endpoint(&self) -> String {
        format!("http://localhost:{}", self.socket.port())
    }
}

impl Drop for RangeServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn head_object(
    State(state): State<Arc<ServerState>>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    state.record_auth(&headers);
    match state.lookup(&bucket, &key) {
        Some(contents) => (
            StatusCode::OK,
            [(header::CONTENT_LENGTH, contents.len().to_string())],
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn get_object(
    State(state): State<Arc<ServerState>>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    state.record_auth(&headers);
    state.range_reads.fetch_add(1, Ordering::Relaxed);

    if let Some(status) = *state.fail_status.lock().unwrap() {
        return status.into_response();
    }

    let Some(contents) = state.lookup(&bucket, &key) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok())
        .filter(|_| !state.ignore_ranges.load(Ordering::Relaxed));
    let Some(range) = range else {
        return (StatusCode::OK, contents).into_response();
    };

    let size = contents.len() as u64;
    match parse_range(range) {
        Some((start, end)) if start <= end && end < size => {
            let content_range = format!("bytes {start}-{end}/{size}");
            let body = contents.slice(start as usize..end as usize + 1);
            (
                StatusCode::PARTIAL_CONTENT,
                [(header::CONTENT_RANGE, content_range)],
                body,
            )
                .into_response()
        }
        _ => (
            StatusCode::RANGE_NOT_SATISFIABLE,
            [(header::CONTENT_RANGE, format!("bytes */{size}"))],
        )
            .into_response(),
    }
}

async fn put_object(
    State(state): State<Arc<ServerState>>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    state.record_auth(&headers);
    let mut objects = state.objects.lock().unwrap();
    objects.insert(format!("{bucket}/{key}"), body);
    StatusCode::OK
}

/// Parses an inclusive `bytes=start-end` range.
fn parse_range(value: &str) -> Option<(u64, u64)> {
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    Some((start.trim().parse().ok()?, end.trim().parse().ok()?))
}
