//! Serving of pre-compressed sibling files.
//!
//! For a request path like `/assets/app.js`, probes the document root for
//! `assets/app.js.br` and, when present and admissible, serves its bytes
//! directly with `Content-Encoding: br`, bypassing the streaming encoder.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use http::{Method, Response, header};
use http_body_util::Full;

use crate::accept;

/// File name suffix probed next to the requested file.
pub const SUFFIX: &str = ".br";

/// Policy for serving pre-compressed files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Never probe for pre-compressed files.
    #[default]
    Off,
    /// Serve a pre-compressed file when the client accepts the encoding.
    On,
    /// Serve a pre-compressed file regardless of request headers.
    Always,
}

/// Probes for a pre-compressed sibling of `uri_path` under `root` and builds
/// a response from it.
///
/// Returns `Ok(None)` when the request is not eligible (method, policy,
/// missing accept header) or no `.br` sibling exists. Only the response for
/// a GET should carry the body; for HEAD the caller drops it.
pub fn serve(
    root: &Path,
    uri_path: &str,
    method: &Method,
    accept_encoding: Option<&[u8]>,
    mode: Mode,
) -> io::Result<Option<Response<Full<Bytes>>>> {
    if mode == Mode::Off {
        return Ok(None);
    }
    // Only GET and HEAD requests are supported.
    if *method != Method::GET && *method != Method::HEAD {
        return Ok(None);
    }
    // Only files are supported.
    if uri_path.is_empty() || uri_path.ends_with('/') {
        return Ok(None);
    }
    if mode == Mode::On && !accept_encoding.is_some_and(accept::accepts) {
        return Ok(None);
    }

    let Some(path) = map_path(root, uri_path) else {
        return Ok(None);
    };
    let mut probe = path.into_os_string();
    probe.push(SUFFIX);
    let probe = PathBuf::from(probe);

    let data = match fs::read(&probe) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    tracing::debug!(path = %probe.display(), "serving precompressed file");

    let mut response = Response::new(Full::new(Bytes::from(data)));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_ENCODING,
        header::HeaderValue::from_static(accept::ENCODING),
    );
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static(content_type_for(uri_path)),
    );
    headers.insert(
        header::VARY,
        header::HeaderValue::from_static("accept-encoding"),
    );
    Ok(Some(response))
}

/// Maps a URI path onto the document root, refusing traversal segments.
fn map_path(root: &Path, uri_path: &str) -> Option<PathBuf> {
    let mut path = root.to_path_buf();
    for segment in uri_path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return None,
            segment => path.push(segment),
        }
    }
    Some(path)
}

/// Content type derived from the original (uncompressed) file name.
fn content_type_for(uri_path: &str) -> &'static str {
    let extension = uri_path.rsplit('.').next().unwrap_or("");
    match extension.to_ascii_lowercase().as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "svg" => "image/svg+xml",
        "xml" => "text/xml",
        "txt" => "text/plain",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}
