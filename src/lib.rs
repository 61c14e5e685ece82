//! diskmon - disk health diagnostics as remotely callable tools
//!
//! A server exposes `check_disk_smart` and `list_disks` over JSON-RPC on an
//! HTTP event stream; the client side discovers and invokes them.

pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod id;
pub mod normalize;
pub mod tools;
pub mod transport;

pub use error::{DiskmonError, Result, ResultCode};
