//! Browser-side assets for the minisync development server.
//!
//! Both assets are compiled into the binary so the server never depends on
//! the working directory it was started from:
//!
//! - `client.js`: the live reload client injected into served HTML pages
//! - `favicon.ico`: served at `/favicon.ico`

/// The live reload client script.
pub const CLIENT_SCRIPT: &[u8] = include_bytes!("../assets/client.js");

/// The development server favicon.
pub const FAVICON: &[u8] = include_bytes!("../assets/favicon.ico");

/// MIME type of [`CLIENT_SCRIPT`].
pub const CLIENT_SCRIPT_MIME: &str = "text/javascript";

/// MIME type of [`FAVICON`].
pub const FAVICON_MIME: &str = "image/vnd.microsoft.icon";
