//! Event-stream connection to a diskmon server.
//!
//! Provides:
//! - Session setup (`GET /sse`, wait for the `endpoint` event)
//! - Request/response correlation by JSON-RPC id
//! - Failing every in-flight request when the stream ends

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures::StreamExt;
use log::{debug, info, warn};
use reqwest::{StatusCode, Url};
use reqwest_eventsource::{Event, EventSource, retry};
use serde_json::Value;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;

use crate::error::{DiskmonError, Result};
use crate::transport::protocol::{RpcRequest, RpcResponse};
use crate::transport::sse::{ENDPOINT_EVENT, MESSAGE_EVENT};

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<RpcResponse>>>>>;

/// One open session
pub struct SseConnection {
    http: reqwest::Client,
    message_url: Url,
    pending: PendingMap,
    alive: Arc<AtomicBool>,
    next_id: AtomicU64,
    request_timeout: Option<Duration>,
    reader: JoinHandle<()>,
}

impl SseConnection {
    /// Open the event stream at `url` and wait for the message endpoint
    pub async fn open(url: &str, connect_timeout: Duration, request_timeout: Option<Duration>) -> Result<Self> {
        let base = Url::parse(url).map_err(|e| DiskmonError::Connection(format!("invalid url '{}': {}", url, e)))?;
        let http = reqwest::Client::new();

        let mut source = EventSource::new(http.get(base.clone()))
            .map_err(|e| DiskmonError::Connection(format!("cannot open event stream: {}", e)))?;
        source.set_retry_policy(Box::new(retry::Never));

        let endpoint = match tokio::time::timeout(connect_timeout, wait_for_endpoint(&mut source)).await {
            Ok(endpoint) => endpoint?,
            Err(_) => {
                source.close();
                return Err(DiskmonError::Connection(format!(
                    "no endpoint announced by {} within {}ms",
                    url,
                    connect_timeout.as_millis()
                )));
            }
        };

        let message_url = base
            .join(&endpoint)
            .map_err(|e| DiskmonError::Connection(format!("invalid endpoint '{}': {}", endpoint, e)))?;
        info!("Connected to {}, posting to {}", url, message_url);

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));
        let reader = tokio::spawn(read_events(source, Arc::clone(&pending), Arc::clone(&alive)));

        Ok(Self {
            http,
            message_url,
            pending,
            alive,
            next_id: AtomicU64::new(1),
            request_timeout,
            reader,
        })
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn message_url(&self) -> &Url {
        &self.message_url
    }

    /// Send a request and wait for its response event.
    ///
    /// Without a request timeout this waits until the response arrives or
    /// the stream closes.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();

        // register under the lock so a concurrent stream close cannot miss us
        {
            let mut pending = self.pending.lock().await;
            if !self.is_alive() {
                return Err(DiskmonError::ConnectionLost("event stream is closed".into()));
            }
            pending.insert(id, tx);
        }

        if let Err(e) = self.post(&RpcRequest::new(id, method, params)).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        let outcome = match self.request_timeout {
            None => rx.await,
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    self.pending.lock().await.remove(&id);
                    return Err(DiskmonError::Timeout(format!(
                        "{} got no response within {}ms",
                        method,
                        limit.as_millis()
                    )));
                }
            },
        };

        match outcome {
            Ok(Ok(response)) => response.into_result(),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DiskmonError::ConnectionLost("response channel closed".into())),
        }
    }

    /// Send a notification; no response is expected
    pub async fn notify(&self, method: &str) -> Result<()> {
        if !self.is_alive() {
            return Err(DiskmonError::ConnectionLost("event stream is closed".into()));
        }
        self.post(&RpcRequest::notification(method)).await
    }

    async fn post(&self, message: &RpcRequest) -> Result<()> {
        let response = self
            .http
            .post(self.message_url.clone())
            .json(message)
            .send()
            .await
            .map_err(|e| DiskmonError::ConnectionLost(format!("failed to send {}: {}", message.method, e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::NOT_FOUND {
            return Err(DiskmonError::ConnectionLost("server no longer knows this session".into()));
        }
        let body = response.text().await.unwrap_or_default();
        Err(DiskmonError::Protocol {
            code: i64::from(status.as_u16()),
            message: format!("{} rejected: {}", message.method, body.trim()),
        })
    }

    /// Close the stream and fail anything still waiting
    pub async fn close(&self) {
        self.reader.abort();
        fail_pending(&self.pending, &self.alive, "connection closed by client").await;
    }
}

impl Drop for SseConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn wait_for_endpoint(source: &mut EventSource) -> Result<String> {
    while let Some(event) = source.next().await {
        match event {
            Ok(Event::Open) => debug!("Event stream open"),
            Ok(Event::Message(message)) if message.event == ENDPOINT_EVENT => {
                return Ok(message.data.trim().to_string());
            }
            Ok(Event::Message(message)) => debug!("Ignoring '{}' event before endpoint", message.event),
            Err(e) => {
                source.close();
                return Err(DiskmonError::Connection(format!("event stream failed: {}", e)));
            }
        }
    }
    Err(DiskmonError::Connection("event stream closed before endpoint was announced".into()))
}

async fn read_events(mut source: EventSource, pending: PendingMap, alive: Arc<AtomicBool>) {
    while let Some(event) = source.next().await {
        match event {
            Ok(Event::Message(message)) if message.event == MESSAGE_EVENT => {
                route_response(&message.data, &pending).await;
            }
            Ok(_) => {}
            Err(reqwest_eventsource::Error::StreamEnded) => {
                info!("Event stream ended");
                break;
            }
            Err(e) => {
                warn!("Event stream failed: {}", e);
                break;
            }
        }
    }
    source.close();
    fail_pending(&pending, &alive, "event stream closed").await;
}

async fn route_response(data: &str, pending: &PendingMap) {
    let response: RpcResponse = match serde_json::from_str(data) {
        Ok(response) => response,
        Err(e) => {
            warn!("Unparseable message event: {}", e);
            return;
        }
    };

    let Some(id) = response.numeric_id() else {
        // e.g. a parse error the server could not attribute
        warn!("Response without request id: {:?}", response.error);
        return;
    };

    match pending.lock().await.remove(&id) {
        Some(tx) => {
            let _ = tx.send(Ok(response));
        }
        None => debug!("Response for unknown request {}", id),
    }
}

async fn fail_pending(pending: &PendingMap, alive: &AtomicBool, reason: &str) {
    let mut pending = pending.lock().await;
    alive.store(false, Ordering::SeqCst);
    if !pending.is_empty() {
        warn!("Failing {} in-flight requests: {}", pending.len(), reason);
    }
    for (_, tx) in pending.drain() {
        let _ = tx.send(Err(DiskmonError::ConnectionLost(reason.to_string())));
    }
}
