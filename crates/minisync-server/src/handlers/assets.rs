//! Client script and favicon handlers.

use axum::body::Body;
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};

use super::NO_CACHE;

/// Serve the browser-side live reload script.
pub(crate) async fn client_script() -> Response {
    asset_response(
        minisync_assets::CLIENT_SCRIPT,
        minisync_assets::CLIENT_SCRIPT_MIME,
    )
}

/// Serve the development server favicon.
pub(crate) async fn favicon() -> Response {
    asset_response(minisync_assets::FAVICON, minisync_assets::FAVICON_MIME)
}

fn asset_response(content: &'static [u8], mime: &'static str) -> Response {
    (
        [
            (header::CACHE_CONTROL, HeaderValue::from_static(NO_CACHE)),
            (header::CONTENT_LENGTH, HeaderValue::from(content.len())),
            (header::CONTENT_TYPE, HeaderValue::from_static(mime)),
        ],
        Body::from(content),
    )
        .into_response()
}
