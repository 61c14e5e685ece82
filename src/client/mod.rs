//! Client side - connect to a diskmon server and call its tools

pub mod connection;
pub mod reconnect;
pub mod render;
pub mod session;

pub use connection::SseConnection;
pub use reconnect::ReconnectPolicy;
pub use session::{ClientOptions, ClientState, DiskHealthClient};
