use axum::{
    body::Body,
    http::{HeaderValue, header},
    response::Response,
};
use futures::{Stream, StreamExt};

use crate::normalized::{NormalizedEvent, sse_event};

/// Wrap a turn's events as a `text/event-stream` response.
pub fn build_sse_response<S>(events: S) -> Response
where
    S: Stream<Item = NormalizedEvent> + Send + 'static,
{
    let frames = events.map(|event| Ok::<String, std::convert::Infallible>(sse_event(&event)));

    let mut resp = Response::new(Body::from_stream(frames));
    let h = resp.headers_mut();
    h.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    h.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    h.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    h.insert("X-Accel-Buffering", HeaderValue::from_static("no"));
    resp
}
