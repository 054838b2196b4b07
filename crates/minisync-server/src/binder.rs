//! Port binder.
//!
//! Binds the listening socket, moving to the next port whenever the
//! preferred one is taken.

use std::io;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;

/// Delay before retrying on the next port.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Default number of ports tried before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 100;

/// Error binding the listening socket.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    /// A non-conflict error (permissions, unavailable address, ...).
    #[error("failed to bind port {port}: {source}")]
    Fatal {
        port: u16,
        #[source]
        source: io::Error,
    },
    /// Every port in the retry budget was in use.
    #[error("no free port in {first}..={last} after {attempts} attempts")]
    Exhausted { first: u16, last: u16, attempts: u32 },
    /// The server was closed while still looking for a port.
    #[error("bind cancelled by close")]
    Cancelled,
}

/// Binds a listener with retry on address conflicts.
#[derive(Clone, Debug)]
pub struct PortBinder {
    host: String,
    max_attempts: u32,
    retry_delay: Duration,
}

impl PortBinder {
    /// Create a binder for `host` with the default retry budget.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Set how many ports are tried before [`BindError::Exhausted`].
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the delay between attempts.
    #[must_use]
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Bind starting at `preferred`, returning the listener and its port.
    ///
    /// On `AddrInUse` waits for the retry delay and tries the next port. The
    /// wait is abandoned as soon as `cancel` becomes `true`.
    pub async fn bind(
        &self,
        preferred: u16,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<(TcpListener, u16), BindError> {
        let mut port = preferred;
        let mut attempts = 0;

        loop {
            if *cancel.borrow() {
                return Err(BindError::Cancelled);
            }

            attempts += 1;
            match TcpListener::bind((self.host.as_str(), port)).await {
                Ok(listener) => {
                    let bound = listener
                        .local_addr()
                        .map_err(|source| BindError::Fatal { port, source })?
                        .port();
                    tracing::debug!(port = bound, attempts, "Bound listener");
                    return Ok((listener, bound));
                }
                Err(err) if err.kind() == io::ErrorKind::AddrInUse => {
                    let exhausted = BindError::Exhausted {
                        first: preferred,
                        last: port,
                        attempts,
                    };
                    if attempts >= self.max_attempts {
                        return Err(exhausted);
                    }
                    let Some(next) = port.checked_add(1) else {
                        return Err(exhausted);
                    };

                    tracing::info!(port, next, "Port in use, trying next");
                    tokio::select! {
                        () = tokio::time::sleep(self.retry_delay) => {}
                        () = cancelled(&mut cancel) => return Err(BindError::Cancelled),
                    }
                    port = next;
                }
                Err(source) => return Err(BindError::Fatal { port, source }),
            }
        }
    }
}

/// Resolve once `cancel` turns `true` or its sender is dropped.
pub(crate) async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|cancelled| *cancelled).await;
}
