//! Server-sent event frame encoding

use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

pub const ENDPOINT_EVENT: &str = "endpoint";
pub const MESSAGE_EVENT: &str = "message";

/// Encode one named event. Multi-line data is split across `data:` lines.
pub fn event(name: &str, data: &str) -> Bytes {
    let mut frame = String::with_capacity(data.len() + name.len() + 16);
    frame.push_str("event: ");
    frame.push_str(name);
    frame.push('\n');
    for line in data.split('\n') {
        frame.push_str("data: ");
        frame.push_str(line.strip_suffix('\r').unwrap_or(line));
        frame.push('\n');
    }
    frame.push('\n');
    Bytes::from(frame)
}

/// Comment frame, ignored by clients; keeps idle connections open
pub fn comment(text: &str) -> Bytes {
    Bytes::from(format!(": {}\n\n", text))
}

/// Wrap a body stream as an event-stream response
pub fn response(body: Body) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        body,
    )
        .into_response()
}
