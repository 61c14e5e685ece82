//! Error types for diskmon
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in diskmon
#[derive(Debug, Error)]
pub enum DiskmonError {
    /// Caller input rejected before any process was spawned
    #[error("Validation error: {0}")]
    Validation(String),

    /// Required executable is not installed or not on PATH
    #[error("Command unavailable: {0}")]
    CommandUnavailable(String),

    /// External command failed to start or produced unusable output
    #[error("Execution error: {0}")]
    Execution(String),

    /// Enumeration output violates the expected schema
    #[error("Parse error: {0}")]
    Parse(String),

    /// A tool with this name is already registered
    #[error("Duplicate tool: {0}")]
    DuplicateTool(String),

    /// No tool registered under this name
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Arguments do not match the tool's parameter schema
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Could not establish (or re-establish) a session with the server
    #[error("Connection error: {0}")]
    Connection(String),

    /// The event stream closed while an invocation was in flight
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// No response arrived within the configured request timeout
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The server answered with a protocol-level error
    #[error("Protocol error {code}: {message}")]
    Protocol { code: i64, message: String },

    /// Bad configuration value
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DiskmonError {
    /// Transport failures move the client back to `Disconnected`
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::ConnectionLost(_))
    }
}

/// Result type alias for diskmon operations
pub type Result<T> = std::result::Result<T, DiskmonError>;

/// Numeric code carried next to every tool payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Success,
    CommandUnavailable,
    ExecutionFailed,
    ParseFailed,
    Unexpected,
    DeviceUnavailable,
    InvalidArgument,
}

impl ResultCode {
    pub const ALL: [ResultCode; 7] = [
        Self::Success,
        Self::CommandUnavailable,
        Self::ExecutionFailed,
        Self::ParseFailed,
        Self::Unexpected,
        Self::DeviceUnavailable,
        Self::InvalidArgument,
    ];

    pub fn as_u16(&self) -> u16 {
        match self {
            Self::Success => 0,
            Self::CommandUnavailable => 1001,
            Self::ExecutionFailed => 1002,
            Self::ParseFailed => 1003,
            Self::Unexpected => 1004,
            Self::DeviceUnavailable => 1005,
            Self::InvalidArgument => 1006,
        }
    }

    pub fn from_u16(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_u16() == code)
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::CommandUnavailable => "command not found or permission denied",
            Self::ExecutionFailed => "command execution failed",
            Self::ParseFailed => "failed to parse response",
            Self::Unexpected => "unexpected exception occurred",
            Self::DeviceUnavailable => "device not available or no matching hardware found",
            Self::InvalidArgument => "invalid argument",
        }
    }

    /// Code reported to the caller for an error raised while serving a tool
    pub fn from_error(err: &DiskmonError) -> Self {
        match err {
            DiskmonError::CommandUnavailable(_) => Self::CommandUnavailable,
            DiskmonError::Execution(_) | DiskmonError::Io(_) | DiskmonError::Timeout(_) => Self::ExecutionFailed,
            DiskmonError::Parse(_) | DiskmonError::Json(_) => Self::ParseFailed,
            DiskmonError::Validation(_) | DiskmonError::InvalidArguments(_) => Self::InvalidArgument,
            _ => Self::Unexpected,
        }
    }
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

impl serde::Serialize for ResultCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.as_u16())
    }
}

impl<'de> serde::Deserialize<'de> for ResultCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let code = <u16 as serde::Deserialize>::deserialize(deserializer)?;
        Self::from_u16(code).ok_or_else(|| serde::de::Error::custom(format!("unknown result code {}", code)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let err = DiskmonError::Validation("device path must start with /dev/".to_string());
        assert_eq!(err.to_string(), "Validation error: device path must start with /dev/");
    }

    #[test]
    fn test_duplicate_tool_error() {
        let err = DiskmonError::DuplicateTool("list_disks".to_string());
        assert_eq!(err.to_string(), "Duplicate tool: list_disks");
    }

    #[test]
    fn test_protocol_error() {
        let err = DiskmonError::Protocol {
            code: -32601,
            message: "Method not found: foo".to_string(),
        };
        assert_eq!(err.to_string(), "Protocol error -32601: Method not found: foo");
    }

    #[test]
    fn test_is_transport() {
        assert!(DiskmonError::ConnectionLost("stream ended".into()).is_transport());
        assert!(DiskmonError::Connection("refused".into()).is_transport());
        assert!(!DiskmonError::Execution("boom".into()).is_transport());
        assert!(!DiskmonError::Validation("bad".into()).is_transport());
    }

    #[test]
    fn test_result_codes() {
        assert_eq!(ResultCode::Success.as_u16(), 0);
        assert_eq!(ResultCode::CommandUnavailable.as_u16(), 1001);
        assert_eq!(ResultCode::DeviceUnavailable.as_u16(), 1005);
        assert_eq!(ResultCode::from_u16(1003), Some(ResultCode::ParseFailed));
        assert_eq!(ResultCode::from_u16(42), None);
    }

    #[test]
    fn test_result_code_from_error() {
        let code = |e: DiskmonError| ResultCode::from_error(&e);
        assert_eq!(code(DiskmonError::CommandUnavailable("smartctl".into())), ResultCode::CommandUnavailable);
        assert_eq!(code(DiskmonError::Execution("timed out".into())), ResultCode::ExecutionFailed);
        assert_eq!(code(DiskmonError::Parse("bad size".into())), ResultCode::ParseFailed);
        assert_eq!(code(DiskmonError::Validation("bad path".into())), ResultCode::InvalidArgument);
        assert_eq!(code(DiskmonError::Config("x".into())), ResultCode::Unexpected);
    }

    #[test]
    fn test_result_code_serde() {
        assert_eq!(serde_json::to_string(&ResultCode::ParseFailed).unwrap(), "1003");
        let code: ResultCode = serde_json::from_str("1005").unwrap();
        assert_eq!(code, ResultCode::DeviceUnavailable);
        assert!(serde_json::from_str::<ResultCode>("7").is_err());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "smartctl missing");
        let err: DiskmonError = io_err.into();
        assert!(matches!(err, DiskmonError::Io(_)));
        assert!(err.to_string().contains("smartctl missing"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: DiskmonError = json_err.into();
        assert!(matches!(err, DiskmonError::Json(_)));
    }
}
