//! Per-connection lifecycle.
//!
//! Every event stream moves `Open -> Closed(reason)` exactly once. Whichever
//! signal arrives first (body finished, transport error, client gone, server
//! shutdown) performs the single unregistration; later signals are no-ops.

use std::convert::Infallible;
use std::sync::{Arc, Mutex, PoisonError};

use axum::body::{Body, Bytes};
use futures_util::stream;
use tokio::sync::mpsc;

use crate::registry::{
    ChannelSink, ConnectionId, ConnectionRegistry, FRAME_QUEUE_CAPACITY, FrameSink,
};

/// Why a connection ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The response body ran to completion.
    Finished,
    /// Writing to the transport failed.
    TransportError,
    /// The client went away and the body was dropped.
    TransportClosed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LinkState {
    Open,
    Closed(CloseReason),
}

/// Lifecycle of one registered event stream.
pub struct ConnectionLifecycle {
    id: ConnectionId,
    registry: Arc<ConnectionRegistry>,
    state: Mutex<LinkState>,
}

impl ConnectionLifecycle {
    #[must_use]
    pub fn new(id: ConnectionId, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            id,
            registry,
            state: Mutex::new(LinkState::Open),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Reason the connection closed, or `None` while open.
    pub fn close_reason(&self) -> Option<CloseReason> {
        match *self.state.lock().unwrap_or_else(PoisonError::into_inner) {
            LinkState::Open => None,
            LinkState::Closed(reason) => Some(reason),
        }
    }

    /// Transition to closed. Returns `true` only for the first call.
    pub fn close(&self, reason: CloseReason) -> bool {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != LinkState::Open {
                return false;
            }
            *state = LinkState::Closed(reason);
        }

        self.registry.unregister(self.id);
        tracing::debug!(id = %self.id, ?reason, "Connection closed");
        true
    }
}

/// Closes its lifecycle when dropped together with the response body.
struct CloseOnDrop(Arc<ConnectionLifecycle>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close(CloseReason::TransportClosed);
    }
}

/// Open an event stream: queue `first_frame`, register, and build the body.
///
/// The first frame is queued before registration so no broadcast can
/// overtake it.
pub(crate) fn open_stream(
    registry: &Arc<ConnectionRegistry>,
    first_frame: Bytes,
) -> (Arc<ConnectionLifecycle>, Body) {
    let (tx, rx) = mpsc::channel::<Bytes>(FRAME_QUEUE_CAPACITY);
    let id = ConnectionId::new();
    let sink = Arc::new(ChannelSink::new(tx));
    let lifecycle = Arc::new(ConnectionLifecycle::new(id, Arc::clone(registry)));

    if sink.send(first_frame).is_err() {
        lifecycle.close(CloseReason::TransportError);
    } else {
        registry.register(id, sink);
    }

    let guard = CloseOnDrop(Arc::clone(&lifecycle));
    let frames = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        match rx.recv().await {
            Some(frame) => Some((Ok::<_, Infallible>(frame), (rx, guard))),
            None => {
                guard.0.close(CloseReason::Finished);
                None
            }
        }
    });

    (lifecycle, Body::from_stream(frames))
}
