//! HTTP server exposing the event stream and message endpoint
//!
//! - `GET /sse` opens a session and streams its events
//! - `POST /messages?session_id=<id>` queues one JSON-RPC message

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use log::{error, info};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::config::Config;
use crate::error::{DiskmonError, Result};
use crate::executor::WorkerPool;
use crate::tools::ToolRegistry;

use super::protocol::RpcRequest;
use super::session::{Inbound, SessionRegistry, Submission, run_session};
use super::sse;

pub const SSE_PATH: &str = "/sse";
pub const MESSAGES_PATH: &str = "/messages";

const MIN_KEEPALIVE: Duration = Duration::from_millis(100);

/// Everything request handlers share
#[derive(Clone)]
pub struct ServerState {
    pub registry: Arc<ToolRegistry>,
    pub sessions: SessionRegistry,
    pub pool: WorkerPool,
    pub keepalive: Duration,
    /// Pretty-print tool payload text
    pub pretty_json: bool,
    pub server_name: String,
}

impl ServerState {
    pub fn new(registry: ToolRegistry, pool: WorkerPool) -> Self {
        Self {
            registry: Arc::new(registry),
            sessions: SessionRegistry::new(),
            pool,
            keepalive: Duration::from_secs(15),
            pretty_json: false,
            server_name: "DiskHealthChecker".to_string(),
        }
    }

    /// Apply server settings from config
    pub fn from_config(registry: ToolRegistry, config: &Config) -> Self {
        Self::new(registry, WorkerPool::new(config.executor.workers))
            .with_keepalive(Duration::from_secs(config.server.keepalive_secs))
            .with_pretty_json(config.debug)
            .with_name(config.server.name.clone())
    }

    pub fn with_keepalive(mut self, keepalive: Duration) -> Self {
        self.keepalive = keepalive.max(MIN_KEEPALIVE);
        self
    }

    pub fn with_pretty_json(mut self, pretty: bool) -> Self {
        self.pretty_json = pretty;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct SessionQuery {
    session_id: String,
}

/// Bound, not yet serving
pub struct DiskServer {
    listener: TcpListener,
    state: ServerState,
}

impl DiskServer {
    pub async fn bind(addr: &str, state: ServerState) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| DiskmonError::Connection(format!("Failed to bind {}: {}", addr, e)))?;
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Event-stream URL clients connect to
    pub fn sse_url(&self) -> Result<String> {
        Ok(format!("http://{}{}", self.local_addr()?, SSE_PATH))
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    pub fn router(state: ServerState) -> Router {
        Router::new()
            .route(SSE_PATH, get(open_stream))
            .route(MESSAGES_PATH, post(post_message))
            .with_state(state)
    }

    /// Serve until `shutdown` resolves; open sessions are closed first so
    /// their streams end and graceful shutdown can complete.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        let sessions = self.state.sessions.clone();
        let router = Self::router(self.state);

        info!("Serving on http://{}{}", addr, SSE_PATH);
        axum::serve(self.listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!("Shutting down");
                sessions.clear().await;
            })
            .await
            .map_err(|e| {
                error!("Server error: {}", e);
                DiskmonError::Io(e)
            })
    }
}

async fn open_stream(State(state): State<ServerState>) -> Response {
    let (session_id, requests) = state.sessions.open().await;
    let (events, rx) = mpsc::unbounded_channel::<std::result::Result<Bytes, io::Error>>();

    let endpoint = format!("{}?session_id={}", MESSAGES_PATH, session_id);
    // receiver is alive, send cannot fail
    let _ = events.send(Ok(sse::event(sse::ENDPOINT_EVENT, &endpoint)));

    tokio::spawn(run_session(session_id, state, requests, events));
    sse::response(Body::from_stream(UnboundedReceiverStream::new(rx)))
}

async fn post_message(
    State(state): State<ServerState>,
    Query(query): Query<SessionQuery>,
    body: Bytes,
) -> Response {
    let inbound = match serde_json::from_slice::<RpcRequest>(&body) {
        Ok(request) => Inbound::Request(request),
        Err(e) => Inbound::Malformed(e.to_string()),
    };
    let malformed = matches!(inbound, Inbound::Malformed(_));

    match state.sessions.submit(&query.session_id, inbound).await {
        Submission::Queued => {}
        Submission::Full => return (StatusCode::SERVICE_UNAVAILABLE, "Session queue is full").into_response(),
        Submission::UnknownSession => return (StatusCode::NOT_FOUND, "Could not find session").into_response(),
    }
    if malformed {
        return (StatusCode::BAD_REQUEST, "Could not parse message").into_response();
    }
    (StatusCode::ACCEPTED, "Accepted").into_response()
}
