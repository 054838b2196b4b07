//! Reload events and their event-stream framing.

use std::time::Duration;

use axum::body::Bytes;
use serde::Serialize;

/// Keepalive frame: an event-stream comment, ignored by clients.
pub const PING_FRAME: &str = ":ping\n";

/// Kind of pushed event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// Reload the page or a single asset.
    Reload,
    /// No-op frame keeping idle connections open.
    Keepalive,
}

/// Event sent to connected clients.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReloadEvent {
    kind: EventKind,
    file: Option<String>,
}

/// JSON payload of a `reload` frame.
#[derive(Serialize)]
struct ReloadPayload<'a> {
    file: &'a str,
}

impl ReloadEvent {
    /// Reload event. An empty or absent `file` means the whole page.
    #[must_use]
    pub fn reload(file: Option<&str>) -> Self {
        Self {
            kind: EventKind::Reload,
            file: file.filter(|f| !f.is_empty()).map(str::to_owned),
        }
    }

    /// Keepalive event.
    #[must_use]
    pub fn keepalive() -> Self {
        Self {
            kind: EventKind::Keepalive,
            file: None,
        }
    }

    /// Event kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Targeted file, if any.
    #[must_use]
    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    /// Encode the event as an event-stream frame.
    #[must_use]
    pub fn to_frame(&self) -> Bytes {
        match self.kind {
            EventKind::Keepalive => Bytes::from_static(PING_FRAME.as_bytes()),
            EventKind::Reload => {
                let payload = ReloadPayload {
                    file: self.file.as_deref().unwrap_or_default(),
                };
                // Serializing a struct with a single string field cannot fail.
                let data = serde_json::to_string(&payload).unwrap_or_else(|_| "{}".to_owned());
                Bytes::from(format!("event: reload\ndata: {data}\n\n"))
            }
        }
    }
}

/// Frame telling the client how long to wait before reconnecting.
#[must_use]
pub fn retry_frame(interval: Duration) -> Bytes {
    Bytes::from(format!("retry: {}\n", interval.as_millis()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_page_reload_frame() {
        let frame = ReloadEvent::reload(None).to_frame();
        assert_eq!(frame, "event: reload\ndata: {\"file\":\"\"}\n\n");
    }

    #[test]
    fn test_empty_file_means_whole_page() {
        let event = ReloadEvent::reload(Some(""));
        assert_eq!(event.file(), None);
        assert_eq!(event, ReloadEvent::reload(None));
    }

    #[test]
    fn test_targeted_reload_frame() {
        let frame = ReloadEvent::reload(Some("styles.css")).to_frame();
        assert_eq!(frame, "event: reload\ndata: {\"file\":\"styles.css\"}\n\n");
    }

    #[test]
    fn test_file_is_json_escaped() {
        let frame = ReloadEvent::reload(Some("dir/\"odd\".css")).to_frame();
        assert_eq!(
            frame,
            "event: reload\ndata: {\"file\":\"dir/\\\"odd\\\".css\"}\n\n"
        );
    }

    #[test]
    fn test_keepalive_frame() {
        let event = ReloadEvent::keepalive();
        assert_eq!(event.kind(), EventKind::Keepalive);
        assert_eq!(event.to_frame(), ":ping\n");
    }

    #[test]
    fn test_retry_frame() {
        assert_eq!(retry_frame(Duration::from_secs(10)), "retry: 10000\n");
    }
}
