//! Static file serving.
//!
//! Served directories are tried in order and the first hit wins. File
//! lookup itself is delegated to `tower-http`'s `ServeDir`. When client
//! script injection is enabled, HTML pages are read here instead so the
//! script tag can be spliced in before `</head>`.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Method, Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::CLIENT_SCRIPT_PATH;
use crate::state::AppState;

/// Extensions treated as HTML pages, in lookup order.
const HTML_EXTENSIONS: [&str; 2] = ["html", "htm"];

/// Serve a request from the configured directories.
///
/// Only GET and HEAD requests get the injected page; other methods go
/// straight to `ServeDir`.
pub(crate) async fn serve(State(state): State<Arc<AppState>>, req: Request<Body>) -> Response {
    if state.inject_client_script
        && matches!(*req.method(), Method::GET | Method::HEAD)
        && let Some(response) = serve_injected_html(&state.dirs, req.uri().path()).await
    {
        return response;
    }

    for dir in &state.dirs {
        let Ok(response) = ServeDir::new(dir).oneshot(clone_request(&req)).await;
        if response.status() != StatusCode::NOT_FOUND {
            return response.map(Body::new);
        }
    }

    StatusCode::NOT_FOUND.into_response()
}

/// Copy method, URI and headers of a body-less request.
fn clone_request(req: &Request<Body>) -> Request<Body> {
    let mut clone = Request::new(Body::empty());
    clone.method_mut().clone_from(req.method());
    clone.uri_mut().clone_from(req.uri());
    clone.headers_mut().clone_from(req.headers());
    clone
}

/// Splice the client script tag in front of the first `</head>`.
///
/// Documents without a `</head>` are returned unchanged.
pub(crate) fn inject_client_script(html: &str) -> String {
    let tag = format!("<script async src=\"{CLIENT_SCRIPT_PATH}\"></script>\n</head>");
    html.replacen("</head>", &tag, 1)
}

/// Relative file paths that may hold the HTML page for `request_path`.
///
/// Returns `None` for paths that are not valid UTF-8 after decoding or that
/// try to leave the served directory.
fn html_candidates(request_path: &str) -> Option<Vec<PathBuf>> {
    let decoded = percent_decode_str(request_path).decode_utf8().ok()?;

    let mut base = PathBuf::new();
    for segment in decoded.split('/') {
        match Path::new(segment).components().next() {
            None | Some(Component::CurDir) => {}
            Some(Component::Normal(_)) if !segment.contains('\\') => base.push(segment),
            Some(_) => return None,
        }
    }

    let is_html = base
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| HTML_EXTENSIONS.contains(&ext));
    if is_html {
        return Some(vec![base]);
    }

    let mut candidates = Vec::new();
    for ext in HTML_EXTENSIONS {
        if !base.as_os_str().is_empty() {
            let mut file = base.clone().into_os_string();
            file.push(".");
            file.push(ext);
            candidates.push(PathBuf::from(file));
        }
        candidates.push(base.join(format!("index.{ext}")));
    }
    Some(candidates)
}

/// Find the first existing HTML file for `request_path` across `dirs`.
async fn find_html(dirs: &[PathBuf], request_path: &str) -> Option<PathBuf> {
    let candidates = html_candidates(request_path)?;

    for dir in dirs {
        for candidate in &candidates {
            let path = dir.join(candidate);
            if tokio::fs::metadata(&path)
                .await
                .is_ok_and(|meta| meta.is_file())
            {
                return Some(path);
            }
        }
    }
    None
}

/// Serve the HTML page for `request_path` with the client script injected.
async fn serve_injected_html(dirs: &[PathBuf], request_path: &str) -> Option<Response> {
    let path = find_html(dirs, request_path).await?;

    let html = match tokio::fs::read_to_string(&path).await {
        Ok(html) => html,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Cannot read HTML page, serving as-is");
            return None;
        }
    };
    let rendered = inject_client_script(&html);

    let last_modified = tokio::fs::metadata(&path)
        .await
        .and_then(|meta| meta.modified())
        .map(|modified| http_date(modified.into()))
        .unwrap_or_else(|_| http_date(Utc::now()));

    Some(
        (
            [
                (header::CONTENT_TYPE, "text/html; charset=utf-8".to_owned()),
                (header::LAST_MODIFIED, last_modified),
                (header::CACHE_CONTROL, "no-store".to_owned()),
                (header::CONTENT_LENGTH, rendered.len().to_string()),
            ],
            rendered,
        )
            .into_response(),
    )
}

/// Format a timestamp as an HTTP date (RFC 7231 IMF-fixdate).
fn http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
