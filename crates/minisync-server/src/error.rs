//! Server error types.

use std::io;

use crate::binder::BindError;

/// Error from the [`DevServer`](crate::DevServer) lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listening socket could not be bound.
    #[error(transparent)]
    Bind(#[from] BindError),

    /// `start` was called on a server that is not freshly created.
    #[error("server cannot start while {0}")]
    InvalidState(&'static str),

    /// `close` was called on a server that is not running.
    #[error("server is not running")]
    NotRunning,

    /// The listening socket reported an error while shutting down.
    #[error("failed to close server: {0}")]
    Close(#[source] io::Error),
}
