//! Client error types.

use eventsource_stream::EventStreamError;

use crate::reconnect::Failure;

/// Error from an event-stream connection.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Connecting or reading the stream failed at the transport level.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("server responded with status {0}")]
    Status(u16),

    /// The server answered with something other than an event stream.
    #[error("unexpected content type: {0}")]
    ContentType(String),

    /// The server URL cannot be parsed.
    #[error("invalid server URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The byte stream does not follow the event-stream line format.
    #[error("malformed event stream: {0}")]
    Framing(String),

    /// A reload event carried malformed data.
    #[error("invalid reload payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl From<EventStreamError<reqwest::Error>> for ClientError {
    fn from(err: EventStreamError<reqwest::Error>) -> Self {
        match err {
            EventStreamError::Transport(err) => Self::Request(err),
            other => Self::Framing(other.to_string()),
        }
    }
}

impl ClientError {
    /// How the reconnector should treat this error.
    ///
    /// A bad payload leaves the stream usable. Transport and framing errors
    /// mean the stream is gone but the server may be back soon. A server that
    /// answers with the wrong status or content type has refused the
    /// stream outright, as a browser `EventSource` would treat it.
    #[must_use]
    pub fn failure(&self) -> Failure {
        match self {
            Self::Payload(_) => Failure::Transient,
            Self::Request(_) | Self::Framing(_) => Failure::Disconnected,
            Self::Status(_) | Self::ContentType(_) | Self::InvalidUrl { .. } => {
                Failure::PermanentlyClosed
            }
        }
    }
}
