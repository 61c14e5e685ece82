//! Transport/session layer - JSON-RPC over an HTTP event stream
//!
//! Provides:
//! - Wire message types (`protocol`)
//! - Event frame encoding (`sse`)
//! - Session registry and per-session dispatch (`session`)
//! - The axum server (`server`)

pub mod protocol;
pub mod server;
pub mod session;
pub mod sse;

pub use protocol::{CallToolParams, ErrorCode, Methods, RpcError, RpcRequest, RpcResponse};
pub use server::{DiskServer, MESSAGES_PATH, SSE_PATH, ServerState};
pub use session::{Inbound, MAX_IN_FLIGHT, MAX_QUEUED_REQUESTS, SessionRegistry, Submission};
