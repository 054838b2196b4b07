//! Event-stream connection and reconnecting driver.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures_util::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Deserialize;

use crate::EVENT_PATH;
use crate::error::ClientError;
use crate::reconnect::{Action, ConnectionState, Failure, Reconnector};

/// A reload event received from the server.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ReloadEvent {
    #[serde(default)]
    file: String,
}

impl ReloadEvent {
    /// File to reload, or `None` for the whole page.
    pub fn file(&self) -> Option<&str> {
        (!self.file.is_empty()).then_some(self.file.as_str())
    }
}

/// A message read from an open stream.
///
/// Keepalive comments never surface; they only keep the transport busy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// The server's reconnect hint.
    Retry(Duration),
    /// A reload event.
    Reload(ReloadEvent),
}

type Events = Pin<Box<dyn Stream<Item = Result<Event, EventStreamError<reqwest::Error>>> + Send>>;

/// One open event-stream connection.
pub struct EventStream {
    events: Events,
    pending: Option<Message>,
}

impl EventStream {
    /// Open the event stream at `url`.
    ///
    /// # Errors
    ///
    /// Fails if the request fails, the server answers with a non-success
    /// status, or the response is not `text/event-stream`.
    pub async fn connect(http: &reqwest::Client, url: &str) -> Result<Self, ClientError> {
        let response = http
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !content_type.starts_with("text/event-stream") {
            return Err(ClientError::ContentType(content_type.to_owned()));
        }

        Ok(Self {
            events: Box::pin(response.bytes_stream().eventsource()),
            pending: None,
        })
    }

    /// Read the next message. `Ok(None)` means the server ended the stream.
    ///
    /// A `retry:` field is reported when the event carrying it is
    /// dispatched, before that event itself.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Request`] if the transport fails and
    /// [`ClientError::Payload`] for a malformed reload event; the stream
    /// stays usable after the latter.
    pub async fn next(&mut self) -> Result<Option<Message>, ClientError> {
        if let Some(message) = self.pending.take() {
            return Ok(Some(message));
        }

        while let Some(event) = self.events.next().await {
            let event = event?;

            let reload = if event.event == "reload" {
                Some(serde_json::from_str(&event.data).map(Message::Reload))
            } else {
                tracing::debug!(event = %event.event, "Ignoring unknown event");
                None
            };

            match (event.retry, reload) {
                (Some(delay), reload) => {
                    self.pending = match reload {
                        Some(Ok(message)) => Some(message),
                        Some(Err(err)) => {
                            tracing::warn!(error = %err, "Dropping malformed reload event");
                            None
                        }
                        None => None,
                    };
                    return Ok(Some(Message::Retry(delay)));
                }
                (None, Some(reload)) => return Ok(Some(reload?)),
                (None, None) => {}
            }
        }
        Ok(None)
    }
}

/// Something the driver reports to its handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientEvent {
    /// A stream was opened.
    Connected,
    /// A reload event arrived.
    Reload(ReloadEvent),
    /// The stream is gone; a new attempt follows after `retry_in`.
    Disconnected { retry_in: Duration },
}

/// Keeps one event stream open, reconnecting forever.
pub struct Client {
    http: reqwest::Client,
    url: String,
    reconnector: Reconnector,
}

impl Client {
    /// Create a client for the server at `base` (e.g. `http://localhost:3000`).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] if `base` is not an absolute
    /// HTTP(S) URL.
    pub fn new(base: &str) -> Result<Self, ClientError> {
        let invalid = |reason: String| ClientError::InvalidUrl {
            url: base.to_owned(),
            reason,
        };

        let base_url = reqwest::Url::parse(base).map_err(|e| invalid(e.to_string()))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {}", base_url.scheme())));
        }
        let url = base_url
            .join(EVENT_PATH)
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            http: reqwest::Client::new(),
            url: url.into(),
            reconnector: Reconnector::default(),
        })
    }

    /// Replace the reconnector, e.g. to change the back-off.
    #[must_use]
    pub fn with_reconnector(mut self, reconnector: Reconnector) -> Self {
        self.reconnector = reconnector;
        self
    }

    /// Event-stream URL this client connects to.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        self.reconnector.state()
    }

    /// Run until `shutdown` resolves, passing events to `handler`.
    pub async fn run<F>(&mut self, mut handler: F, shutdown: impl Future<Output = ()>)
    where
        F: FnMut(ClientEvent),
    {
        tokio::pin!(shutdown);

        loop {
            let action = tokio::select! {
                () = &mut shutdown => break,
                action = self.session(&mut handler) => action,
            };
            let Action::Retry(delay) = action else { break };

            tracing::info!(url = %self.url, ?delay, "Lost connection, trying to reconnect");
            handler(ClientEvent::Disconnected { retry_in: delay });

            tokio::select! {
                () = &mut shutdown => break,
                () = tokio::time::sleep(delay) => {}
            }
            self.reconnector.reconnect();
        }

        self.reconnector.shutdown();
        tracing::debug!(url = %self.url, "Client stopped");
    }

    /// Open one stream and read it until it fails for good.
    async fn session<F>(&mut self, handler: &mut F) -> Action
    where
        F: FnMut(ClientEvent),
    {
        let mut stream = match EventStream::connect(&self.http, &self.url).await {
            Ok(stream) => stream,
            Err(err) => {
                tracing::debug!(error = %err, "Connect failed");
                return self.reconnector.fail(err.failure());
            }
        };

        self.reconnector.opened();
        tracing::info!(url = %self.url, "Development server has connected");
        handler(ClientEvent::Connected);

        loop {
            match stream.next().await {
                Ok(Some(Message::Retry(delay))) => self.reconnector.set_retry_hint(delay),
                Ok(Some(Message::Reload(event))) => handler(ClientEvent::Reload(event)),
                Ok(None) => return self.reconnector.fail(Failure::Disconnected),
                Err(err) => match self.reconnector.fail(err.failure()) {
                    Action::Continue => tracing::warn!(error = %err, "Stream error"),
                    action => return action,
                },
            }
        }
    }
}
