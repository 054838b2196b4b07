//! Application state.
//!
//! Shared state for all request handlers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::registry::ConnectionRegistry;

/// Application state shared across all handlers.
pub(crate) struct AppState {
    /// Live event streams of this server instance.
    pub(crate) registry: Arc<ConnectionRegistry>,
    /// Served directories, in lookup order.
    pub(crate) dirs: Vec<PathBuf>,
    /// Inject the client script into served HTML.
    pub(crate) inject_client_script: bool,
    /// Reconnect hint sent as the first frame of every stream.
    pub(crate) retry_interval: Duration,
}
