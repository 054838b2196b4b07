//! Reconnect state machine.
//!
//! ```text
//! Connecting ──opened──► Open
//!     ▲                   │ Disconnected / PermanentlyClosed
//!     │                   ▼
//!     └──reconnect── Reconnecting
//!
//! any state ──shutdown──► PermanentlyClosed
//! ```
//!
//! There is no retry limit: a dev server may restart any number of times
//! during a session.

use std::time::Duration;

/// Back-off before a fresh connection after the server refused the stream.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// Client-side connection state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Reconnecting,
    PermanentlyClosed,
}

/// Classification of a transport failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Failure {
    /// A hiccup on a stream that is still open. Logged, not acted on.
    Transient,
    /// The stream dropped or could not be opened.
    Disconnected,
    /// The server refused the stream; only a fresh connection can recover.
    PermanentlyClosed,
}

/// What the driver should do after a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// Keep reading the current stream.
    Continue,
    /// Open a new connection after the delay.
    Retry(Duration),
    /// The client was shut down.
    Stop,
}

/// Connection state machine.
#[derive(Clone, Debug)]
pub struct Reconnector {
    state: ConnectionState,
    reconnect_delay: Duration,
    retry_hint: Option<Duration>,
    attempts: u64,
}

impl Default for Reconnector {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_DELAY)
    }
}

impl Reconnector {
    /// Create a reconnector in the `Connecting` state.
    #[must_use]
    pub fn new(reconnect_delay: Duration) -> Self {
        Self {
            state: ConnectionState::Connecting,
            reconnect_delay,
            retry_hint: None,
            attempts: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Reconnections made so far.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Record the server's `retry:` hint, used after a plain disconnect.
    pub fn set_retry_hint(&mut self, hint: Duration) {
        self.retry_hint = Some(hint);
    }

    /// The handshake succeeded.
    pub fn opened(&mut self) {
        if self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Open;
        }
    }

    /// Classify a failure into the next action.
    ///
    /// `Transient` only means something on an open stream; before the
    /// handshake completes any failure is a disconnect.
    pub fn fail(&mut self, failure: Failure) -> Action {
        let failure = match (self.state, failure) {
            (ConnectionState::PermanentlyClosed, _) => return Action::Stop,
            (ConnectionState::Open, Failure::Transient) => return Action::Continue,
            (_, Failure::Transient) => Failure::Disconnected,
            (_, failure) => failure,
        };

        self.state = ConnectionState::Reconnecting;
        let delay = match failure {
            Failure::Disconnected => self.retry_hint.unwrap_or(self.reconnect_delay),
            Failure::Transient | Failure::PermanentlyClosed => self.reconnect_delay,
        };
        Action::Retry(delay)
    }

    /// The back-off elapsed; a new attempt begins.
    pub fn reconnect(&mut self) {
        if self.state == ConnectionState::Reconnecting {
            self.state = ConnectionState::Connecting;
            self.attempts += 1;
        }
    }

    /// Stop for good. Every later failure yields [`Action::Stop`].
    pub fn shutdown(&mut self) {
        self.state = ConnectionState::PermanentlyClosed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_then_drop_then_reconnect() {
        let mut reconnector = Reconnector::default();
        assert_eq!(reconnector.state(), ConnectionState::Connecting);

        reconnector.opened();
        assert_eq!(reconnector.state(), ConnectionState::Open);

        assert_eq!(
            reconnector.fail(Failure::Disconnected),
            Action::Retry(DEFAULT_RECONNECT_DELAY)
        );
        assert_eq!(reconnector.state(), ConnectionState::Reconnecting);

        reconnector.reconnect();
        assert_eq!(reconnector.state(), ConnectionState::Connecting);
        assert_eq!(reconnector.attempts(), 1);
    }

    #[test]
    fn test_transient_on_open_stream_is_ignored() {
        let mut reconnector = Reconnector::default();
        reconnector.opened();

        assert_eq!(reconnector.fail(Failure::Transient), Action::Continue);
        assert_eq!(reconnector.state(), ConnectionState::Open);
    }

    #[test]
    fn test_transient_while_connecting_is_disconnect() {
        let mut reconnector = Reconnector::new(Duration::from_secs(5));

        assert_eq!(
            reconnector.fail(Failure::Transient),
            Action::Retry(Duration::from_secs(5))
        );
        assert_eq!(reconnector.state(), ConnectionState::Reconnecting);
    }

    #[test]
    fn test_retry_hint_applies_to_disconnects_only() {
        let mut reconnector = Reconnector::new(Duration::from_secs(5));
        reconnector.set_retry_hint(Duration::from_millis(250));
        reconnector.opened();

        assert_eq!(
            reconnector.fail(Failure::Disconnected),
            Action::Retry(Duration::from_millis(250))
        );
        reconnector.reconnect();
        assert_eq!(
            reconnector.fail(Failure::PermanentlyClosed),
            Action::Retry(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_retries_indefinitely() {
        let mut reconnector = Reconnector::default();

        for _ in 0..1000 {
            assert!(matches!(
                reconnector.fail(Failure::Disconnected),
                Action::Retry(_)
            ));
            reconnector.reconnect();
        }
        assert_eq!(reconnector.attempts(), 1000);
    }

    #[test]
    fn test_shutdown_is_terminal() {
        let mut reconnector = Reconnector::default();
        reconnector.opened();
        reconnector.shutdown();

        assert_eq!(reconnector.fail(Failure::Disconnected), Action::Stop);
        reconnector.reconnect();
        reconnector.opened();
        assert_eq!(reconnector.state(), ConnectionState::PermanentlyClosed);
    }
}
