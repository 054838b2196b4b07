//! Client side of minisync live reload.
//!
//! Mirrors what `client.js` does in the browser, for headless use and tests:
//!
//! - [`Reconnector`]: connection state machine with tri-state failure
//!   classification
//! - [`EventStream`]: one HTTP event-stream connection, framed by
//!   `eventsource-stream`
//! - [`Client`]: drives [`EventStream`]s forever, reconnecting on drop
//! - [`ReloadDispatcher`]: turns a reload event into a targeted asset
//!   refresh or a full page reload on a [`Document`]
//!
//! # Example
//!
//! ```ignore
//! use minisync_client::{Client, ClientEvent, HtmlDocument, ReloadDispatcher};
//!
//! let mut document = HtmlDocument::parse(&html);
//! let dispatcher = ReloadDispatcher::new();
//! let mut client = Client::new("http://localhost:3000")?;
//!
//! client
//!     .run(
//!         |event| {
//!             if let ClientEvent::Reload(reload) = event {
//!                 dispatcher.dispatch(&mut document, reload.file());
//!             }
//!         },
//!         tokio::signal::ctrl_c().map(|_| ()),
//!     )
//!     .await;
//! ```

mod client;
mod dispatch;
mod error;
mod reconnect;

pub use client::{Client, ClientEvent, EventStream, Message, ReloadEvent};
pub use dispatch::{AssetKind, Dispatch, Document, HtmlDocument, ReloadDispatcher};
pub use error::ClientError;
pub use reconnect::{Action, ConnectionState, DEFAULT_RECONNECT_DELAY, Failure, Reconnector};

/// Path of the server's event-stream endpoint.
pub const EVENT_PATH: &str = "/__mini_sync__";
