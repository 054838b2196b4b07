//! Cache-control middleware.
//!
//! A development server must never let the browser serve stale files, so
//! every response without its own `Cache-Control` gets `no-store`.

use axum::http::{HeaderValue, header};
use tower_http::set_header::SetResponseHeaderLayer;

/// Default `Cache-Control` value for served files.
const NO_STORE: &str = "no-store";

/// Create layer that adds `Cache-Control: no-store` unless already set.
pub(crate) fn no_store_layer() -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::if_not_present(header::CACHE_CONTROL, HeaderValue::from_static(NO_STORE))
}
