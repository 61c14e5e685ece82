//! Per-session state and dispatch
//!
//! Each `/sse` stream owns one session: an inbound request channel (fed by
//! `POST /messages`) and a dispatcher task that answers on the stream.
//! Responses leave in request order; tool jobs run on the worker pool.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::{FuturesOrdered, StreamExt};
use log::{debug, info, warn};
use serde_json::{Value, json};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{RwLock, mpsc};
use tokio::time::{Instant, MissedTickBehavior};

use crate::id::generate_session_id;
use crate::tools::ToolInvocationRequest;

use super::protocol::{
    CallToolParams, JSONRPC_VERSION, Methods, RpcError, RpcRequest, RpcResponse, initialize_result,
};
use super::server::ServerState;
use super::sse;

/// Messages a session accepts before `POST /messages` is refused
pub const MAX_QUEUED_REQUESTS: usize = 64;

/// Requests a session dispatcher holds at once, answered or not
pub const MAX_IN_FLIGHT: usize = 64;

/// Frame sink of one event stream
pub type EventSender = mpsc::UnboundedSender<Result<Bytes, io::Error>>;

/// What `POST /messages` hands to a session
#[derive(Debug, Clone)]
pub enum Inbound {
    Request(RpcRequest),
    /// Body was not a JSON-RPC request
    Malformed(String),
}

/// Outcome of handing a message to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Queued,
    /// The session's request queue is at capacity
    Full,
    UnknownSession,
}

#[derive(Debug)]
struct SessionHandle {
    requests: mpsc::Sender<Inbound>,
    opened_at: DateTime<Utc>,
}

/// Open sessions by id
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session and return its id and request queue
    pub async fn open(&self) -> (String, mpsc::Receiver<Inbound>) {
        let (tx, rx) = mpsc::channel(MAX_QUEUED_REQUESTS);
        let id = generate_session_id();
        self.sessions.write().await.insert(
            id.clone(),
            SessionHandle {
                requests: tx,
                opened_at: Utc::now(),
            },
        );
        info!("Session {} opened", id);
        (id, rx)
    }

    /// Queue a message for a session without waiting for room
    pub async fn submit(&self, session_id: &str, inbound: Inbound) -> Submission {
        let sessions = self.sessions.read().await;
        let Some(handle) = sessions.get(session_id) else {
            return Submission::UnknownSession;
        };
        match handle.requests.try_send(inbound) {
            Ok(()) => Submission::Queued,
            Err(TrySendError::Full(_)) => {
                warn!("Session {}: request queue full ({})", session_id, MAX_QUEUED_REQUESTS);
                Submission::Full
            }
            Err(TrySendError::Closed(_)) => Submission::UnknownSession,
        }
    }

    pub async fn remove(&self, session_id: &str) {
        if let Some(handle) = self.sessions.write().await.remove(session_id) {
            let open_for = Utc::now() - handle.opened_at;
            info!("Session {} closed after {}s", session_id, open_for.num_seconds());
        }
    }

    /// Drop every session; their streams end
    pub async fn clear(&self) {
        let mut sessions = self.sessions.write().await;
        if !sessions.is_empty() {
            info!("Closing {} sessions", sessions.len());
        }
        sessions.clear();
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

/// Serve one session until its stream or request queue closes.
pub async fn run_session(
    session_id: String,
    state: ServerState,
    mut requests: mpsc::Receiver<Inbound>,
    events: EventSender,
) {
    let mut pending: FuturesOrdered<BoxFuture<'static, Option<RpcResponse>>> = FuturesOrdered::new();
    let mut keepalive = tokio::time::interval_at(Instant::now() + state.keepalive, state.keepalive);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            // a full dispatcher leaves requests queued, which backs up into `submit`
            inbound = requests.recv(), if pending.len() < MAX_IN_FLIGHT => {
                match inbound {
                    Some(inbound) => pending.push_back(dispatch(&session_id, &state, inbound)),
                    // session removed from the registry
                    None => break,
                }
            }
            Some(response) = pending.next(), if !pending.is_empty() => {
                let Some(response) = response else { continue };
                match serde_json::to_string(&response) {
                    Ok(json) => {
                        if events.send(Ok(sse::event(sse::MESSAGE_EVENT, &json))).is_err() {
                            break;
                        }
                        keepalive.reset();
                    }
                    Err(e) => warn!("Session {}: failed to encode response: {}", session_id, e),
                }
            }
            _ = keepalive.tick() => {
                // removed from the registry while the dispatcher was saturated
                if requests.is_closed() {
                    break;
                }
                if events.send(Ok(sse::comment("ping"))).is_err() {
                    break;
                }
            }
            _ = events.closed() => break,
        }
    }

    if !pending.is_empty() {
        warn!("Session {} ended with {} responses undelivered", session_id, pending.len());
    }
    state.sessions.remove(&session_id).await;
}

fn respond(response: RpcResponse) -> BoxFuture<'static, Option<RpcResponse>> {
    future::ready(Some(response)).boxed()
}

fn dispatch(session_id: &str, state: &ServerState, inbound: Inbound) -> BoxFuture<'static, Option<RpcResponse>> {
    let request = match inbound {
        Inbound::Request(request) => request,
        Inbound::Malformed(reason) => {
            warn!("Session {}: unparseable message: {}", session_id, reason);
            return respond(RpcResponse::error(
                Value::Null,
                RpcError::parse_error(format!("Parse error: {}", reason)),
            ));
        }
    };

    tracing::debug!(session = %session_id, method = %request.method, id = ?request.id, "dispatch");

    let Some(id) = request.id.clone() else {
        debug!("Session {}: notification {}", session_id, request.method);
        return future::ready(None).boxed();
    };

    if request.jsonrpc != JSONRPC_VERSION {
        return respond(RpcResponse::error(
            id,
            RpcError::invalid_request(format!("unsupported jsonrpc version '{}'", request.jsonrpc)),
        ));
    }

    match request.method.as_str() {
        Methods::INITIALIZE => respond(RpcResponse::success(id, initialize_result(&state.server_name))),
        Methods::PING => respond(RpcResponse::success(id, json!({}))),
        Methods::TOOLS_LIST => respond(RpcResponse::success(id, json!({ "tools": state.registry.list() }))),
        Methods::TOOLS_CALL => call_tool(session_id, state, id, request.params),
        other => respond(RpcResponse::error(id, RpcError::method_not_found(other))),
    }
}

fn call_tool(session_id: &str, state: &ServerState, id: Value, params: Value) -> BoxFuture<'static, Option<RpcResponse>> {
    let params: CallToolParams = match serde_json::from_value(params) {
        Ok(params) => params,
        Err(e) => return respond(RpcResponse::error(id, RpcError::invalid_params(format!("tools/call: {}", e)))),
    };

    if !state.registry.contains(&params.name) {
        return respond(RpcResponse::error(
            id,
            RpcError::invalid_params(format!("Unknown tool: {}", params.name)),
        ));
    }

    let registry = state.registry.clone();
    let pretty = state.pretty_json;
    let label = format!("{}:{}", session_id, params.name);
    let request = ToolInvocationRequest::new(params.name, params.arguments).with_correlation_id(id.clone());
    let job = state.pool.submit(label, async move { registry.invoke(request).await });

    async move {
        let response = match job.await {
            Ok(Ok(result)) => match serde_json::to_value(result.to_call_result(pretty)) {
                Ok(value) => RpcResponse::success(id, value),
                Err(e) => RpcResponse::error(id, RpcError::internal_error(e.to_string())),
            },
            Ok(Err(e)) => RpcResponse::error(id, RpcError::from(&e)),
            Err(e) => RpcResponse::error(id, RpcError::internal_error(format!("tool job failed: {}", e))),
        };
        Some(response)
    }
    .boxed()
}
