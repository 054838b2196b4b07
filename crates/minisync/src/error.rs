//! CLI error types.

use minisync_client::ClientError;
use minisync_config::ConfigError;
use minisync_server::ServerError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Server(#[from] ServerError),

    #[error("{0}")]
    Client(#[from] ClientError),

    #[error("cannot watch files: {0}")]
    Watch(String),
}
