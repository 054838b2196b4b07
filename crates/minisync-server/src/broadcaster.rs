//! Event broadcaster.
//!
//! Fans frames out to every registered connection. Each write is isolated:
//! a failing connection never stops delivery to the others, and it is not
//! removed here. Removal happens when its transport reports closure.

use std::sync::Arc;

use crate::event::ReloadEvent;
use crate::registry::ConnectionRegistry;

/// Outcome of one fan-out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Write attempts made (one per registered connection).
    pub attempted: usize,
    /// Attempts that failed.
    pub failed: usize,
}

impl BroadcastReport {
    /// Writes that were accepted by their transport.
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.attempted - self.failed
    }
}

/// Writes events to all connections of one registry.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl Broadcaster {
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Send `event` to every registered connection.
    pub fn broadcast(&self, event: &ReloadEvent) -> BroadcastReport {
        let frame = event.to_frame();
        let mut report = BroadcastReport::default();

        self.registry.for_each(|id, sink| {
            report.attempted += 1;
            if let Err(err) = sink.send(frame.clone()) {
                report.failed += 1;
                tracing::debug!(%id, error = %err, "Write to connection failed");
            }
        });

        report
    }

    /// Send a keepalive frame to every registered connection.
    pub fn keepalive(&self) -> BroadcastReport {
        self.broadcast(&ReloadEvent::keepalive())
    }
}
