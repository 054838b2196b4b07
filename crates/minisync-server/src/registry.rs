//! Connection registry.
//!
//! Tracks every open event stream by identity. The registry is owned by one
//! [`DevServer`](crate::DevServer), so several servers in one process never
//! share clients.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::body::Bytes;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Opaque identity of a registered connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocate a fresh identity.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Frames one connection may have queued before it counts as stalled.
pub(crate) const FRAME_QUEUE_CAPACITY: usize = 64;

/// Error writing a frame to a connection.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The transport is gone.
    #[error("connection closed")]
    Closed,

    /// The client stopped reading and its queue is full.
    #[error("connection stalled")]
    Full,
}

/// Write side of one event stream.
pub trait FrameSink: Send + Sync {
    /// Queue a frame for delivery.
    fn send(&self, frame: Bytes) -> Result<(), SinkError>;

    /// Terminate the stream. Subsequent sends fail.
    fn close(&self);
}

/// Frame sink backed by a bounded channel feeding an HTTP response body.
///
/// A full queue fails the write and closes the sink; the body then ends
/// after the queued frames, so the client reconnects instead of silently
/// missing reloads.
pub(crate) struct ChannelSink {
    tx: Mutex<Option<mpsc::Sender<Bytes>>>,
}

impl ChannelSink {
    pub(crate) fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }
}

impl FrameSink for ChannelSink {
    fn send(&self, frame: Bytes) -> Result<(), SinkError> {
        let mut tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = tx.as_ref() else {
            return Err(SinkError::Closed);
        };

        match sender.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SinkError::Closed),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tx.take();
                Err(SinkError::Full)
            }
        }
    }

    fn close(&self) {
        // Dropping the sender ends the response body stream.
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

#[derive(Default)]
struct Inner {
    connections: HashMap<ConnectionId, Arc<dyn FrameSink>>,
    closed: bool,
}

/// Set of live connections keyed by [`ConnectionId`].
///
/// Mutated from the accept handler, the broadcaster and each connection's
/// close path, so every access goes through one mutex.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: Mutex<Inner>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a connection.
    ///
    /// Registering an identity twice keeps the first sink. Once the registry
    /// has been closed the sink is closed immediately instead and `false` is
    /// returned.
    pub fn register(&self, id: ConnectionId, sink: Arc<dyn FrameSink>) -> bool {
        let mut inner = self.lock();
        if inner.closed {
            drop(inner);
            sink.close();
            return false;
        }
        inner.connections.entry(id).or_insert(sink);
        tracing::debug!(%id, total = inner.connections.len(), "Connection registered");
        true
    }

    /// Remove a connection. No-op if absent.
    pub fn unregister(&self, id: ConnectionId) {
        let mut inner = self.lock();
        if inner.connections.remove(&id).is_some() {
            tracing::debug!(%id, total = inner.connections.len(), "Connection unregistered");
        }
    }

    /// Whether `id` is currently registered.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.lock().connections.contains_key(&id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.lock().connections.len()
    }

    /// Whether no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.lock().connections.is_empty()
    }

    /// Visit every registered connection in unspecified order.
    ///
    /// The visit runs over a snapshot taken without holding the lock, so `f`
    /// may register or unregister connections (including the one visited).
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(ConnectionId, &dyn FrameSink),
    {
        let snapshot: Vec<(ConnectionId, Arc<dyn FrameSink>)> = self
            .lock()
            .connections
            .iter()
            .map(|(id, sink)| (*id, Arc::clone(sink)))
            .collect();

        for (id, sink) in snapshot {
            f(id, sink.as_ref());
        }
    }

    /// Close every registered connection and refuse new registrations.
    ///
    /// Returns the number of connections that were terminated.
    pub fn close_all(&self) -> usize {
        let drained: Vec<Arc<dyn FrameSink>> = {
            let mut inner = self.lock();
            inner.closed = true;
            inner.connections.drain().map(|(_, sink)| sink).collect()
        };

        for sink in &drained {
            sink.close();
        }
        drained.len()
    }
}
