//! Static asset responder for `GET` requests.
//!
//! Request paths are used exactly as received (no percent-decoding). A path
//! is first normalized lexically, refusing any `..` that would climb above
//! the root, then canonicalized and required to stay inside the canonical
//! root so a symlink cannot lead out of it either.

use std::path::{Path, PathBuf};

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::debug;

/// Where static content comes from.
#[derive(Debug, Clone)]
pub struct AssetConfig {
    /// Directory every asset path is resolved under.
    pub root: PathBuf,
    /// File served for `/favicon.ico`. Falls back to the asset root.
    pub favicon: Option<PathBuf>,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("build/html"),
            favicon: None,
        }
    }
}

/// Answer a `GET` for `request_path`.
pub async fn serve(config: &AssetConfig, request_path: &str) -> Response {
    let request_path = if request_path == "/" { "/index.html" } else { request_path };

    let file = match (&config.favicon, request_path) {
        (Some(icon), "/favicon.ico") => Some(icon.clone()),
        _ => locate(&config.root, request_path).await,
    };

    let Some(file) = file else {
        debug!("No asset for {request_path}");
        return not_found();
    };

    match tokio::fs::read(&file).await {
        Ok(bytes) => {
            let content_type = if request_path == "/favicon.ico" {
                "image/x-icon"
            } else {
                content_type(&file)
            };
            ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
        Err(e) => {
            debug!("Failed to read {}: {e}", file.display());
            not_found()
        }
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "File not found").into_response()
}

/// Content type for a served file, by extension.
pub fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("js") => "application/javascript",
        Some("css") => "text/css",
        Some("html") => "text/html",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

/// Resolve `request_path` to an existing file inside `root`.
async fn locate(root: &Path, request_path: &str) -> Option<PathBuf> {
    let relative = normalize(request_path)?;
    let root = tokio::fs::canonicalize(root).await.ok()?;
    let candidate = tokio::fs::canonicalize(root.join(relative)).await.ok()?;
    if !candidate.starts_with(&root) {
        debug!("Rejected {request_path}: resolves outside the asset root");
        return None;
    }
    let metadata = tokio::fs::metadata(&candidate).await.ok()?;
    metadata.is_file().then_some(candidate)
}

/// Collapse `.` and `..` segments. `None` if the path climbs above its
/// root or contains a segment that is not a plain file name.
pub fn normalize(request_path: &str) -> Option<PathBuf> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in request_path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            s if s.contains(['\\', ':', '\0']) => return None,
            s => segments.push(s),
        }
    }
    Some(segments.iter().collect())
}
