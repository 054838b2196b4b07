//! Event-stream endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};

use super::NO_CACHE;
use crate::connection;
use crate::event;
use crate::state::AppState;

/// Open a server-push stream and register it for reload events.
///
/// The stream stays open until the client goes away or the server closes.
pub(crate) async fn subscribe(State(state): State<Arc<AppState>>) -> Response {
    let first_frame = event::retry_frame(state.retry_interval);
    let (lifecycle, body) = connection::open_stream(&state.registry, first_frame);
    tracing::info!(id = %lifecycle.id(), "Client connected");

    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream")),
            (header::CACHE_CONTROL, HeaderValue::from_static(NO_CACHE)),
            (header::CONNECTION, HeaderValue::from_static("keep-alive")),
        ],
        body,
    )
        .into_response()
}
