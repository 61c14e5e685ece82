//! Client reliability wrapper
//!
//! `Disconnected` -> `connect()` -> `Connected` -> `discover()` -> `Ready`.
//! Any transport failure drops back to `Disconnected`; `ensure_ready()`
//! reconnects under a bounded policy. In-flight invocations are never
//! retried.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::config::ClientConfig;
use crate::error::{DiskmonError, Result, ResultCode};
use crate::executor::SmartCheckResult;
use crate::normalize::DeviceForest;
use crate::tools::{CHECK_DISK_SMART, CallToolResult, LIST_DISKS, ToolDescriptor, ToolInvocationResult, ToolSpec};
use crate::transport::protocol::{Methods, initialize_params};

use super::connection::SseConnection;
use super::reconnect::ReconnectPolicy;

/// Where the client is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    /// Session open, catalog not yet fetched
    Connected,
    Ready,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connected => write!(f, "connected"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

/// Timeouts and reconnect policy
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub connect_timeout: Duration,
    pub request_timeout: Option<Duration>,
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: None,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl From<&ClientConfig> for ClientOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            request_timeout: config.request_timeout_ms.map(Duration::from_millis),
            reconnect: ReconnectPolicy::from_config(config),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ToolList {
    tools: Vec<ToolDescriptor>,
}

/// Disk-health client
pub struct DiskHealthClient {
    url: String,
    options: ClientOptions,
    state: ClientState,
    connection: Option<SseConnection>,
    catalog: Vec<ToolSpec>,
    index: HashMap<String, usize>,
    server_info: Option<Value>,
}

impl DiskHealthClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_options(url, ClientOptions::default())
    }

    pub fn with_options(url: impl Into<String>, options: ClientOptions) -> Self {
        Self {
            url: url.into(),
            options,
            state: ClientState::Disconnected,
            connection: None,
            catalog: Vec::new(),
            index: HashMap::new(),
            server_info: None,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::with_options(config.url.clone(), ClientOptions::from(config))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// `serverInfo` reported by `initialize`
    pub fn server_info(&self) -> Option<&Value> {
        self.server_info.as_ref()
    }

    /// Tools discovered in the current session
    pub fn catalog(&self) -> &[ToolSpec] {
        &self.catalog
    }

    /// Open a session and complete the initialize handshake
    pub async fn connect(&mut self) -> Result<()> {
        self.drop_connection().await;

        let connection = SseConnection::open(&self.url, self.options.connect_timeout, self.options.request_timeout).await?;
        let init = connection.request(Methods::INITIALIZE, initialize_params(env!("CARGO_PKG_NAME"))).await;
        let init = match init {
            Ok(init) => init,
            Err(e) => {
                connection.close().await;
                return Err(DiskmonError::Connection(format!("initialize failed: {}", e)));
            }
        };
        if let Err(e) = connection.notify(Methods::INITIALIZED).await {
            connection.close().await;
            return Err(DiskmonError::Connection(format!("initialized notification failed: {}", e)));
        }

        self.server_info = init.get("serverInfo").cloned();
        self.connection = Some(connection);
        self.state = ClientState::Connected;
        info!("Connected to {}", self.url);
        Ok(())
    }

    /// Fetch the tool catalog; moves to `Ready`
    pub async fn discover(&mut self) -> Result<&[ToolSpec]> {
        let listed = self.request(Methods::TOOLS_LIST, json!({})).await?;
        let list: ToolList = serde_json::from_value(listed)?;

        let catalog = list
            .tools
            .iter()
            .map(ToolSpec::from_descriptor)
            .collect::<Result<Vec<_>>>()?;

        self.index = catalog
            .iter()
            .enumerate()
            .map(|(i, spec)| (spec.name.clone(), i))
            .collect();
        self.catalog = catalog;
        self.state = ClientState::Ready;
        debug!("Discovered {} tools", self.catalog.len());
        Ok(&self.catalog)
    }

    /// Reach `Ready`, reconnecting under the policy if needed
    pub async fn ensure_ready(&mut self) -> Result<()> {
        let alive = self.connection.as_ref().is_some_and(SseConnection::is_alive);
        if !alive && self.state != ClientState::Disconnected {
            warn!("Event stream to {} is gone", self.url);
            self.mark_disconnected();
        }

        match self.state {
            ClientState::Ready => return Ok(()),
            ClientState::Connected => {
                if let Err(e) = self.discover().await {
                    if !e.is_transport() {
                        return Err(e);
                    }
                } else {
                    return Ok(());
                }
            }
            ClientState::Disconnected => {}
        }

        let policy = self.options.reconnect.clone();
        let mut last_error = None;
        for attempt in 1..=policy.max_attempts {
            if attempt > 1 {
                let delay = policy.calculate_backoff(attempt - 1);
                debug!("Reconnect attempt {} in {:?}", attempt, delay);
                tokio::time::sleep(delay).await;
            }
            match self.connect().await {
                Ok(()) => match self.discover().await {
                    Ok(_) => return Ok(()),
                    Err(e) => last_error = Some(e),
                },
                Err(e) => last_error = Some(e),
            }
            if let Some(e) = &last_error {
                warn!("Connection attempt {}/{} to {} failed: {}", attempt, policy.max_attempts, self.url, e);
            }
            self.mark_disconnected();
        }

        Err(DiskmonError::Connection(format!(
            "could not reach {} after {} attempt(s): {}",
            self.url,
            policy.max_attempts,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    /// Validate against the catalog and invoke once. Never retried.
    pub async fn invoke(&mut self, tool: &str, args: Map<String, Value>) -> Result<ToolInvocationResult> {
        if self.state != ClientState::Ready {
            return Err(DiskmonError::Connection(format!("client is {}, not ready", self.state)));
        }

        let spec = self
            .index
            .get(tool)
            .and_then(|&i| self.catalog.get(i))
            .ok_or_else(|| DiskmonError::UnknownTool(tool.to_string()))?;
        spec.validate_args(&args)?;

        let raw = self
            .request(Methods::TOOLS_CALL, json!({ "name": tool, "arguments": args }))
            .await?;
        let call: CallToolResult = serde_json::from_value(raw)?;
        ToolInvocationResult::from_call_result(&call)
    }

    /// `ensure_ready` then `invoke`
    pub async fn call(&mut self, tool: &str, args: Map<String, Value>) -> Result<ToolInvocationResult> {
        self.ensure_ready().await?;
        self.invoke(tool, args).await
    }

    pub async fn check_disk_smart(&mut self, device: &str) -> Result<SmartCheckResult> {
        let mut args = Map::new();
        args.insert("device".to_string(), Value::String(device.to_string()));
        let result = self.call(CHECK_DISK_SMART, args).await?;

        if result.payload.is_null() {
            return Err(failure_error(&result));
        }
        let mut check: SmartCheckResult = serde_json::from_value(result.payload)?;
        check.code = result.code;
        Ok(check)
    }

    pub async fn list_disks(&mut self) -> Result<DeviceForest> {
        let result = self.call(LIST_DISKS, Map::new()).await?;
        if !result.success {
            return Err(failure_error(&result));
        }
        Ok(serde_json::from_value(result.payload)?)
    }

    /// Close the session
    pub async fn disconnect(&mut self) {
        self.drop_connection().await;
        self.mark_disconnected();
        info!("Disconnected from {}", self.url);
    }

    async fn request(&mut self, method: &str, params: Value) -> Result<Value> {
        let Some(connection) = self.connection.as_ref() else {
            self.mark_disconnected();
            return Err(DiskmonError::Connection("not connected".into()));
        };
        match connection.request(method, params).await {
            Ok(value) => Ok(value),
            Err(e) => {
                if e.is_transport() {
                    warn!("{} failed, session lost: {}", method, e);
                    self.mark_disconnected();
                }
                Err(e)
            }
        }
    }

    async fn drop_connection(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close().await;
        }
    }

    fn mark_disconnected(&mut self) {
        self.state = ClientState::Disconnected;
        self.connection = None;
        self.catalog.clear();
        self.index.clear();
    }
}

fn failure_error(result: &ToolInvocationResult) -> DiskmonError {
    let message = result.message().to_string();
    match result.code {
        ResultCode::InvalidArgument => DiskmonError::Validation(message),
        ResultCode::ParseFailed => DiskmonError::Parse(message),
        ResultCode::CommandUnavailable => DiskmonError::CommandUnavailable(message),
        _ => DiskmonError::Execution(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let client = DiskHealthClient::new("http://127.0.0.1:1/sse");
        assert_eq!(client.state(), ClientState::Disconnected);
        assert!(client.catalog().is_empty());
        assert!(client.server_info().is_none());
    }

    #[test]
    fn test_options_from_config() {
        let config = ClientConfig {
            request_timeout_ms: Some(2500),
            reconnect_attempts: 3,
            ..Default::default()
        };
        let options = ClientOptions::from(&config);
        assert_eq!(options.request_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(options.reconnect.max_attempts, 3);
    }

    #[tokio::test]
    async fn test_invoke_requires_ready() {
        let mut client = DiskHealthClient::new("http://127.0.0.1:1/sse");
        let err = client.invoke(LIST_DISKS, Map::new()).await.unwrap_err();
        assert!(matches!(err, DiskmonError::Connection(_)));
    }

    #[tokio::test]
    async fn test_ensure_ready_gives_up() {
        let options = ClientOptions {
            connect_timeout: Duration::from_millis(500),
            request_timeout: None,
            reconnect: ReconnectPolicy::new(2).with_delays(Duration::from_millis(10), Duration::from_millis(20)),
        };
        // nothing listens on port 1
        let mut client = DiskHealthClient::with_options("http://127.0.0.1:1/sse", options);
        let err = client.ensure_ready().await.unwrap_err();
        assert!(matches!(err, DiskmonError::Connection(_)));
        assert!(err.to_string().contains("2 attempt(s)"));
        assert_eq!(client.state(), ClientState::Disconnected);
    }

    #[test]
    fn test_failure_error_mapping() {
        let result = ToolInvocationResult::failure(ResultCode::InvalidArgument, "Validation error: bad path");
        assert!(matches!(failure_error(&result), DiskmonError::Validation(_)));
        let result = ToolInvocationResult::failure(ResultCode::ParseFailed, "bad size");
        assert!(matches!(failure_error(&result), DiskmonError::Parse(_)));
        let result = ToolInvocationResult::failure(ResultCode::Unexpected, "boom");
        assert!(matches!(failure_error(&result), DiskmonError::Execution(_)));
    }
}
