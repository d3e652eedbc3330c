use crate::accept::ENCODING;
use crate::body::CompressionBody;
use crate::config::Config;
use crate::session::Session;
use http::{Response, StatusCode, header};
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

pin_project! {
    /// Future for compression service responses.
    pub struct ResponseFuture<F> {
        #[pin]
        inner: F,
        accepted: bool,
        head_request: bool,
        config: Config,
    }
}

impl<F> ResponseFuture<F> {
    pub(crate) fn new(inner: F, accepted: bool, head_request: bool, config: Config) -> Self {
        Self {
            inner,
            accepted,
            head_request,
            config,
        }
    }
}

impl<F, B, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<Response<B>, E>>,
{
    type Output = Result<Response<CompressionBody<B>>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        match this.inner.poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Ready(Ok(response)) => {
                let response =
                    wrap_response(response, *this.accepted, *this.head_request, this.config);
                Poll::Ready(Ok(response))
            }
        }
    }
}

/// Wraps the response body with compression if appropriate.
fn wrap_response<B>(
    response: Response<B>,
    accepted: bool,
    head_request: bool,
    config: &Config,
) -> Response<CompressionBody<B>> {
    let (mut parts, body) = response.into_parts();

    // Determine if we should compress
    let eligible = accepted
        && !head_request
        && is_compressible_status(parts.status)
        && !has_content_encoding(&parts.headers)
        && !has_content_range(&parts.headers)
        && is_allowed_content_type(&parts.headers, config)
        && !is_below_min_length(&parts.headers, config.min_length);

    let body = if eligible {
        // A declared length tunes the encoder window before it is dropped
        // from the headers below.
        let content_length = declared_length(&parts.headers);

        // Check for x-accel-buffering: no header or streaming content types
        let always_flush = parts
            .headers
            .get("x-accel-buffering")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("no"))
            || is_streaming_content_type(&parts.headers);

        // Add Content-Encoding header
        parts.headers.insert(
            header::CONTENT_ENCODING,
            header::HeaderValue::from_static(ENCODING),
        );

        // Remove Content-Length since compressed size is unknown
        parts.headers.remove(header::CONTENT_LENGTH);

        // Remove Accept-Ranges since we can't support ranges on compressed content
        parts.headers.remove(header::ACCEPT_RANGES);

        // A strong validator no longer matches the recoded bytes
        weaken_etag(&mut parts.headers);

        // Add Accept-Encoding to Vary header if not present
        add_vary_accept_encoding(&mut parts.headers);

        let session = Session::new(config.quality, config.window_bits, content_length);
        CompressionBody::compressed(body, session, always_flush)
    } else {
        CompressionBody::passthrough(body)
    };

    Response::from_parts(parts, body)
}

/// Only OK, forbidden, and not-found responses are compressed.
fn is_compressible_status(status: StatusCode) -> bool {
    status == StatusCode::OK || status == StatusCode::FORBIDDEN || status == StatusCode::NOT_FOUND
}

/// Checks if Content-Encoding header is already present.
fn has_content_encoding(headers: &header::HeaderMap) -> bool {
    headers.contains_key(header::CONTENT_ENCODING)
}

/// Checks if Content-Range header is present (range response).
fn has_content_range(headers: &header::HeaderMap) -> bool {
    headers.contains_key(header::CONTENT_RANGE)
}

/// Turns a strong ETag into its weak form.
fn weaken_etag(headers: &mut header::HeaderMap) {
    let Some(etag) = headers.get(header::ETAG) else {
        return;
    };
    let raw = etag.as_bytes();
    if raw.starts_with(b"W/") {
        return;
    }
    let mut weak = Vec::with_capacity(raw.len() + 2);
    weak.extend_from_slice(b"W/");
    weak.extend_from_slice(raw);
    if let Ok(value) = header::HeaderValue::from_bytes(&weak) {
        headers.insert(header::ETAG, value);
    }
}

/// Adds Accept-Encoding to the Vary header if not already present.
fn add_vary_accept_encoding(headers: &mut header::HeaderMap) {
    // Check all Vary headers to see if Accept-Encoding is already present
    for vary in headers.get_all(header::VARY) {
        if let Ok(vary_str) = vary.to_str() {
            let covered = vary_str.split(',').any(|v| {
                let v = v.trim();
                v.eq_ignore_ascii_case("*") || v.eq_ignore_ascii_case("accept-encoding")
            });
            if covered {
                return;
            }
        }
    }

    // Append Accept-Encoding to Vary header
    headers.append(
        header::VARY,
        header::HeaderValue::from_static("accept-encoding"),
    );
}

/// Checks the Content-Type essence against the configured allow-list.
fn is_allowed_content_type(headers: &header::HeaderMap, config: &Config) -> bool {
    let Some(content_type) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };

    let essence = content_type.split(';').next().unwrap_or("").trim();
    config.types.iter().any(|t| t.eq_ignore_ascii_case(essence))
}

/// Checks if the content type requires always flushing (e.g., streaming).
fn is_streaming_content_type(headers: &header::HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| {
            ct.starts_with("text/event-stream") || ct.starts_with("application/grpc-web")
        })
}

/// Checks if a declared Content-Length is below the minimum size.
fn is_below_min_length(headers: &header::HeaderMap, min_length: u64) -> bool {
    declared_length(headers).is_some_and(|len| len < min_length)
}

/// Parses the declared Content-Length, if any.
fn declared_length(headers: &header::HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::CompressState;

    fn config() -> Config {
        // Wide-open defaults so individual tests opt into restrictions.
        Config::new()
            .min_length(0)
            .types(["text/html", "text/css", "application/json", "image/svg+xml"])
    }

    fn make_response(body: &'static str) -> Response<&'static str> {
        let mut response = Response::new(body);
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("text/html"),
        );
        response
    }

    fn make_response_with_headers<I>(body: &'static str, headers: I) -> Response<&'static str>
    where
        I: IntoIterator<Item = (&'static str, &'static str)>,
    {
        let mut response = make_response(body);
        for (name, value) in headers {
            response
                .headers_mut()
                .insert(name, header::HeaderValue::from_static(value));
        }
        response
    }

    fn assert_compressed<B>(response: &Response<CompressionBody<B>>) {
        match response.body() {
            CompressionBody::Compressed { state, .. } => {
                assert_eq!(state.state(), CompressState::Reading);
            }
            _ => panic!("expected compressed body"),
        }
    }

    fn assert_passthrough<B>(response: &Response<CompressionBody<B>>) {
        match response.body() {
            CompressionBody::Passthrough { .. } => {}
            _ => panic!("expected passthrough body"),
        }
    }

    #[test]
    fn test_compress_when_accepted() {
        let wrapped = wrap_response(make_response("hello world"), true, false, &config());

        assert_compressed(&wrapped);
        assert_eq!(
            wrapped.headers().get(header::CONTENT_ENCODING).unwrap(),
            "br"
        );
    }

    #[test]
    fn test_no_compress_when_not_accepted() {
        let wrapped = wrap_response(make_response("hello world"), false, false, &config());

        assert_passthrough(&wrapped);
        assert!(wrapped.headers().get(header::CONTENT_ENCODING).is_none());
    }

    #[test]
    fn test_no_compress_head_request() {
        let wrapped = wrap_response(make_response("hello world"), true, true, &config());
        assert_passthrough(&wrapped);
    }

    #[test]
    fn test_status_filtering() {
        for (status, compressed) in [
            (StatusCode::OK, true),
            (StatusCode::FORBIDDEN, true),
            (StatusCode::NOT_FOUND, true),
            (StatusCode::NO_CONTENT, false),
            (StatusCode::MOVED_PERMANENTLY, false),
            (StatusCode::INTERNAL_SERVER_ERROR, false),
        ] {
            let mut response = make_response("body");
            *response.status_mut() = status;
            let wrapped = wrap_response(response, true, false, &config());
            if compressed {
                assert_compressed(&wrapped);
            } else {
                assert_passthrough(&wrapped);
            }
        }
    }

    #[test]
    fn test_no_compress_when_content_encoding_present() {
        let response =
            make_response_with_headers("hello world", [("content-encoding", "identity")]);
        let wrapped = wrap_response(response, true, false, &config());
        assert_passthrough(&wrapped);
    }

    #[test]
    fn test_no_compress_range_response() {
        let response =
            make_response_with_headers("partial content", [("content-range", "bytes 0-99/200")]);
        let wrapped = wrap_response(response, true, false, &config());
        assert_passthrough(&wrapped);
    }

    #[test]
    fn test_no_compress_type_outside_allow_list() {
        let response = make_response_with_headers("PNG data", [("content-type", "image/png")]);
        let wrapped = wrap_response(response, true, false, &config());
        assert_passthrough(&wrapped);
    }

    #[test]
    fn test_no_compress_missing_content_type() {
        let mut response = Response::new("anonymous bytes");
        response.headers_mut().remove(header::CONTENT_TYPE);
        let wrapped = wrap_response(response, true, false, &config());
        assert_passthrough(&wrapped);
    }

    #[test]
    fn test_compress_allowed_type_with_charset() {
        let response = make_response_with_headers(
            "<html></html>",
            [("content-type", "text/html; charset=utf-8")],
        );
        let wrapped = wrap_response(response, true, false, &config());
        assert_compressed(&wrapped);
    }

    #[test]
    fn test_compress_svg() {
        let response =
            make_response_with_headers("<svg></svg>", [("content-type", "image/svg+xml")]);
        let wrapped = wrap_response(response, true, false, &config());
        assert_compressed(&wrapped);
    }

    #[test]
    fn test_type_match_is_case_insensitive() {
        let response = make_response_with_headers("{}", [("content-type", "Application/JSON")]);
        let wrapped = wrap_response(response, true, false, &config());
        assert_compressed(&wrapped);
    }

    #[test]
    fn test_no_compress_below_min_length() {
        let response = make_response_with_headers("small", [("content-length", "5")]);
        let wrapped = wrap_response(response, true, false, &config().min_length(100));
        assert_passthrough(&wrapped);
    }

    #[test]
    fn test_compress_above_min_length() {
        let response =
            make_response_with_headers("large enough content", [("content-length", "200")]);
        let wrapped = wrap_response(response, true, false, &config().min_length(100));

        assert_compressed(&wrapped);
        // Content-Length should be removed
        assert!(wrapped.headers().get(header::CONTENT_LENGTH).is_none());
    }

    #[test]
    fn test_compress_unknown_length() {
        // No Content-Length header means unknown size, should compress
        let wrapped = wrap_response(
            make_response("unknown size content"),
            true,
            false,
            &config().min_length(100),
        );
        assert_compressed(&wrapped);
    }

    #[test]
    fn test_accept_ranges_removed() {
        let response = make_response_with_headers("hello world", [("accept-ranges", "bytes")]);
        let wrapped = wrap_response(response, true, false, &config());
        assert!(wrapped.headers().get(header::ACCEPT_RANGES).is_none());
    }

    #[test]
    fn test_accept_ranges_kept_when_not_compressing() {
        let response = make_response_with_headers("hello world", [("accept-ranges", "bytes")]);
        let wrapped = wrap_response(response, false, false, &config());
        assert_eq!(
            wrapped.headers().get(header::ACCEPT_RANGES).unwrap(),
            "bytes"
        );
    }

    #[test]
    fn test_strong_etag_weakened() {
        let response = make_response_with_headers("hello world", [("etag", "\"abc123\"")]);
        let wrapped = wrap_response(response, true, false, &config());
        assert_eq!(
            wrapped.headers().get(header::ETAG).unwrap(),
            "W/\"abc123\""
        );
    }

    #[test]
    fn test_weak_etag_untouched() {
        let response = make_response_with_headers("hello world", [("etag", "W/\"abc123\"")]);
        let wrapped = wrap_response(response, true, false, &config());
        assert_eq!(
            wrapped.headers().get(header::ETAG).unwrap(),
            "W/\"abc123\""
        );
    }

    #[test]
    fn test_vary_header_added() {
        let wrapped = wrap_response(make_response("hello world"), true, false, &config());
        assert_eq!(
            wrapped.headers().get(header::VARY).unwrap(),
            "accept-encoding"
        );
    }

    #[test]
    fn test_vary_header_appended() {
        let response = make_response_with_headers("hello world", [("vary", "origin")]);
        let wrapped = wrap_response(response, true, false, &config());

        // With append, there will be two Vary headers
        let vary_values: Vec<_> = wrapped
            .headers()
            .get_all(header::VARY)
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(vary_values, vec!["origin", "accept-encoding"]);
    }

    #[test]
    fn test_vary_header_not_duplicated() {
        let response = make_response_with_headers("hello world", [("vary", "accept-encoding")]);
        let wrapped = wrap_response(response, true, false, &config());
        assert_eq!(
            wrapped.headers().get(header::VARY).unwrap(),
            "accept-encoding"
        );
    }

    #[test]
    fn test_vary_header_star_not_modified() {
        let response = make_response_with_headers("hello world", [("vary", "*")]);
        let wrapped = wrap_response(response, true, false, &config());
        assert_eq!(wrapped.headers().get(header::VARY).unwrap(), "*");
    }

    #[test]
    fn test_always_flush_when_x_accel_buffering_no() {
        let response = make_response_with_headers("streaming data", [("x-accel-buffering", "no")]);
        let wrapped = wrap_response(response, true, false, &config());

        match wrapped.body() {
            CompressionBody::Compressed { state, .. } => {
                assert!(state.always_flush());
            }
            _ => panic!("expected compressed body"),
        }
    }

    #[test]
    fn test_x_accel_buffering_case_insensitive() {
        let response = make_response_with_headers("streaming data", [("x-accel-buffering", "NO")]);
        let wrapped = wrap_response(response, true, false, &config());

        match wrapped.body() {
            CompressionBody::Compressed { state, .. } => {
                assert!(state.always_flush());
            }
            _ => panic!("expected compressed body"),
        }
    }

    #[test]
    fn test_always_flush_event_stream() {
        let response = make_response_with_headers(
            "event: data\n\n",
            [("content-type", "text/event-stream")],
        );
        let wrapped = wrap_response(
            response,
            true,
            false,
            &config().types(["text/event-stream"]),
        );

        match wrapped.body() {
            CompressionBody::Compressed { state, .. } => {
                assert!(state.always_flush());
            }
            _ => panic!("expected compressed body"),
        }
    }

    #[test]
    fn test_no_always_flush_by_default() {
        let wrapped = wrap_response(make_response("normal data"), true, false, &config());

        match wrapped.body() {
            CompressionBody::Compressed { state, .. } => {
                assert!(!state.always_flush());
            }
            _ => panic!("expected compressed body"),
        }
    }
}
