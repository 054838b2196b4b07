//! Router construction.
//!
//! Builds the axum router with all routes and middleware.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::cache;
use crate::state::AppState;
use crate::static_files;
use crate::{CLIENT_SCRIPT_PATH, EVENT_PATH};

/// Create the application router.
///
/// # Arguments
///
/// * `state` - Shared application state
pub(crate) fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(EVENT_PATH, get(handlers::events::subscribe))
        .route(CLIENT_SCRIPT_PATH, get(handlers::assets::client_script))
        .route("/favicon.ico", get(handlers::assets::favicon))
        .fallback(static_files::serve)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cache::no_store_layer()),
        )
        .with_state(state)
}
