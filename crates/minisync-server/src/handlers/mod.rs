//! HTTP request handlers.

pub(crate) mod assets;
pub(crate) mod events;

/// `Cache-Control` for live reload endpoints.
pub(crate) const NO_CACHE: &str = "no-cache, no-store, must-revalidate";
