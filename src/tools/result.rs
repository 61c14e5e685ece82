//! Invocation requests and results
//!
//! `ToolInvocationResult` is what a handler returns; `CallToolResult` is its
//! wire form inside a `tools/call` response.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{DiskmonError, Result, ResultCode};

/// One call of a tool by name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationRequest {
    pub tool: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    /// JSON-RPC id of the request that carried this call
    #[serde(default)]
    pub correlation_id: Value,
}

impl ToolInvocationRequest {
    pub fn new(tool: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            tool: tool.into(),
            arguments,
            correlation_id: Value::Null,
        }
    }

    pub fn with_correlation_id(mut self, id: Value) -> Self {
        self.correlation_id = id;
        self
    }
}

/// Terminal outcome of one invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationResult {
    pub success: bool,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub code: ResultCode,
}

impl ToolInvocationResult {
    pub fn success(payload: Value) -> Self {
        Self {
            success: true,
            payload,
            error: None,
            code: ResultCode::Success,
        }
    }

    /// Failed call with a one-line message
    pub fn failure(code: ResultCode, message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self {
            success: false,
            payload: Value::Null,
            error: Some(one_line(&message)),
            code,
        }
    }

    /// Failed call that still carries a payload
    pub fn failure_with_payload(code: ResultCode, message: impl Into<String>, payload: Value) -> Self {
        Self {
            payload,
            ..Self::failure(code, message)
        }
    }

    pub fn from_error(err: &DiskmonError) -> Self {
        Self::failure(ResultCode::from_error(err), err.to_string())
    }

    /// Caller-facing message: the error if any, else the code's description
    pub fn message(&self) -> &str {
        self.error.as_deref().unwrap_or_else(|| self.code.message())
    }

    /// Envelope placed in `structuredContent`
    pub fn envelope(&self) -> Value {
        json!({
            "code": self.code,
            "message": self.message(),
            "data": self.payload,
        })
    }

    pub fn to_call_result(&self, pretty: bool) -> CallToolResult {
        let envelope = self.envelope();
        let text = if pretty {
            serde_json::to_string_pretty(&envelope)
        } else {
            serde_json::to_string(&envelope)
        }
        .unwrap_or_else(|_| self.message().to_string());

        CallToolResult {
            content: vec![ContentBlock::text(text)],
            structured_content: Some(envelope),
            is_error: !self.success,
        }
    }

    /// Decode a `tools/call` result received from a server
    pub fn from_call_result(result: &CallToolResult) -> Result<Self> {
        let envelope = match &result.structured_content {
            Some(envelope) => envelope.clone(),
            None => {
                let text = result.text();
                match serde_json::from_str::<Value>(&text) {
                    Ok(value) if value.get("code").is_some() => value,
                    // plain-text tool output from a foreign server
                    _ => {
                        return Ok(if result.is_error {
                            Self::failure(ResultCode::Unexpected, text)
                        } else {
                            Self::success(Value::String(text))
                        });
                    }
                }
            }
        };

        let code = envelope
            .get("code")
            .cloned()
            .map(serde_json::from_value::<ResultCode>)
            .transpose()?
            .unwrap_or(if result.is_error {
                ResultCode::Unexpected
            } else {
                ResultCode::Success
            });
        let message = envelope.get("message").and_then(Value::as_str).unwrap_or_default();
        let payload = envelope.get("data").cloned().unwrap_or(Value::Null);

        Ok(if result.is_error || code != ResultCode::Success {
            Self::failure_with_payload(code, message, payload)
        } else {
            Self::success(payload)
        })
    }
}

/// `tools/call` result on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(rename = "structuredContent", default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// All text blocks joined
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: Some(text.into()),
        }
    }
}

fn one_line(message: &str) -> String {
    message.split_whitespace().collect::<Vec<_>>().join(" ")
}
