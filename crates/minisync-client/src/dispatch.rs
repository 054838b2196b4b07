//! Reload dispatcher.
//!
//! A reload without a file reloads the page. A reload naming a stylesheet
//! or image refreshes just the elements referencing it, picked by the
//! longest matching path suffix, with a cache-busting query parameter.
//! Anything else, or an asset the page does not reference, falls back to a
//! full reload.

use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

use percent_encoding::percent_decode_str;
use regex::Regex;

/// Query parameter used to defeat the browser cache.
const CACHE_BUST_PARAM: &str = "livereload";

static STYLESHEET_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.css(?:\.map)?$").expect("invalid stylesheet regex"));

static IMAGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(?:jpe?g|png|gif|svg|webp|avif)$").expect("invalid image regex")
});

static CACHE_BUST_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"([?&]){CACHE_BUST_PARAM}=\d+&?")).expect("invalid cache-bust regex")
});

static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<(link|img)\b([^>]*)>").expect("invalid tag regex"));

static ATTR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)([a-z-]+)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("invalid attribute regex")
});

/// Asset types that can be refreshed in place.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetKind {
    Stylesheet,
    Image,
}

impl AssetKind {
    /// Classify a changed file by extension.
    #[must_use]
    pub fn of(file: &str) -> Option<Self> {
        if STYLESHEET_PATTERN.is_match(file) {
            Some(Self::Stylesheet)
        } else if IMAGE_PATTERN.is_match(file) {
            Some(Self::Image)
        } else {
            None
        }
    }
}

/// The page a reload is applied to.
pub trait Document {
    /// URLs referenced by elements of `kind`, in document order.
    fn references(&self, kind: AssetKind) -> Vec<String>;

    /// Point the `index`-th element of `kind` at `url`.
    fn refresh(&mut self, kind: AssetKind, index: usize, url: &str);

    /// Reload the whole page.
    fn reload_page(&mut self);
}

/// Result of dispatching one reload event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// The whole page was reloaded.
    FullReload,
    /// Only the listed elements were refreshed.
    Refreshed { kind: AssetKind, urls: Vec<String> },
}

/// Applies reload events to a [`Document`].
#[derive(Clone, Copy, Debug)]
pub struct ReloadDispatcher {
    clock: fn() -> u128,
}

impl Default for ReloadDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ReloadDispatcher {
    /// Create a dispatcher stamping cache-busted URLs with the wall clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(unix_millis)
    }

    /// Create a dispatcher with a custom cache-busting stamp source.
    #[must_use]
    pub fn with_clock(clock: fn() -> u128) -> Self {
        Self { clock }
    }

    /// Apply a reload of `file` (`None` or empty: the whole page).
    pub fn dispatch(&self, document: &mut impl Document, file: Option<&str>) -> Dispatch {
        let stamp = (self.clock)();
        let targeted = file
            .filter(|file| !file.is_empty())
            .and_then(|file| Some((file, AssetKind::of(file)?)));

        if let Some((file, kind)) = targeted {
            let references = document.references(kind);
            let matches = best_matches(file, &references);

            if !matches.is_empty() {
                let urls = matches
                    .into_iter()
                    .map(|index| {
                        let url = bust_cache(&references[index], stamp);
                        document.refresh(kind, index, &url);
                        url
                    })
                    .collect();
                tracing::info!(file, ?kind, "Reloaded asset");
                return Dispatch::Refreshed { kind, urls };
            }
        }

        tracing::info!("Reloading entire page");
        document.reload_page();
        Dispatch::FullReload
    }
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis())
}

/// Decoded path component of a URL, absolute or relative.
fn url_path(url: &str) -> String {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let mut path = &url[..end];

    if let Some((_, rest)) = path.split_once("://") {
        path = rest.find('/').map_or("", |slash| &rest[slash..]);
    } else if let Some(rest) = path.strip_prefix("//") {
        path = rest.find('/').map_or("", |slash| &rest[slash..]);
    }

    percent_decode_str(path).decode_utf8_lossy().into_owned()
}

/// Number of trailing path segments `a` and `b` share.
fn match_score(a: &str, b: &str) -> usize {
    a.trim_start_matches('/')
        .rsplit('/')
        .zip(b.trim_start_matches('/').rsplit('/'))
        .take_while(|(x, y)| x == y)
        .count()
}

/// Indices of the references sharing the longest path suffix with `file`.
fn best_matches(file: &str, references: &[String]) -> Vec<usize> {
    let scores: Vec<usize> = references
        .iter()
        .map(|url| match_score(file, &url_path(url)))
        .collect();

    let best = scores.iter().copied().max().unwrap_or(0);
    if best == 0 {
        return Vec::new();
    }

    scores
        .iter()
        .enumerate()
        .filter(|&(_, &score)| score == best)
        .map(|(index, _)| index)
        .collect()
}

/// Replace any previous cache-busting parameter with a fresh one.
fn bust_cache(url: &str, stamp: u128) -> String {
    let (base, hash) = url.find('#').map_or((url, ""), |i| url.split_at(i));

    let cleaned = CACHE_BUST_PATTERN.replace(base, "$1");
    let cleaned = cleaned.trim_end_matches(['?', '&']);
    let separator = if cleaned.contains('?') { '&' } else { '?' };

    format!("{cleaned}{separator}{CACHE_BUST_PARAM}={stamp}{hash}")
}

/// Asset-referencing element found in an HTML page.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Element {
    kind: AssetKind,
    url: String,
}

/// A document model built from page HTML.
///
/// Only `<link rel="stylesheet" href>` and `<img src>` elements are tracked.
/// Refreshes update the model and full reloads are counted, so callers can
/// report what a browser would have done.
#[derive(Clone, Debug, Default)]
pub struct HtmlDocument {
    elements: Vec<Element>,
    page_reloads: usize,
}

impl HtmlDocument {
    /// Extract stylesheet and image references from `html`.
    #[must_use]
    pub fn parse(html: &str) -> Self {
        let elements = TAG_PATTERN
            .captures_iter(html)
            .filter_map(|tag| {
                let attrs = attributes(&tag[2]);
                let attr = |name: &str| {
                    attrs
                        .iter()
                        .find(|(key, _)| key.eq_ignore_ascii_case(name))
                        .map(|(_, value)| value.clone())
                };

                if tag[1].eq_ignore_ascii_case("img") {
                    return attr("src").map(|url| Element {
                        kind: AssetKind::Image,
                        url,
                    });
                }

                let is_stylesheet = attr("rel").is_some_and(|rel| {
                    rel.split_ascii_whitespace()
                        .any(|token| token.eq_ignore_ascii_case("stylesheet"))
                });
                if !is_stylesheet {
                    return None;
                }
                attr("href").map(|url| Element {
                    kind: AssetKind::Stylesheet,
                    url,
                })
            })
            .collect();

        Self {
            elements,
            page_reloads: 0,
        }
    }

    /// Number of full page reloads performed.
    pub fn page_reloads(&self) -> usize {
        self.page_reloads
    }
}

fn attributes(source: &str) -> Vec<(String, String)> {
    ATTR_PATTERN
        .captures_iter(source)
        .map(|caps| {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map_or("", |m| m.as_str());
            (caps[1].to_owned(), value.to_owned())
        })
        .collect()
}

impl Document for HtmlDocument {
    fn references(&self, kind: AssetKind) -> Vec<String> {
        self.elements
            .iter()
            .filter(|element| element.kind == kind)
            .map(|element| element.url.clone())
            .collect()
    }

    fn refresh(&mut self, kind: AssetKind, index: usize, url: &str) {
        if let Some(element) = self
            .elements
            .iter_mut()
            .filter(|element| element.kind == kind)
            .nth(index)
        {
            url.clone_into(&mut element.url);
        }
    }

    fn reload_page(&mut self) {
        self.page_reloads += 1;
    }
}
