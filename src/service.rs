use crate::accept;
use crate::config::Config;
use crate::future::ResponseFuture;
use http::{Method, Request};
use std::task::{Context, Poll};
use tower::Service;

/// A Tower service that compresses HTTP response bodies with Brotli.
#[derive(Debug, Clone)]
pub struct CompressionService<S> {
    inner: S,
    config: Config,
}

impl<S> CompressionService<S> {
    /// Creates a new compression service wrapping the given inner service.
    pub fn new(inner: S, config: Config) -> Self {
        Self { inner, config }
    }

    /// Returns a reference to the inner service.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Returns a mutable reference to the inner service.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Consumes this service, returning the inner service.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for CompressionService<S>
where
    S: Service<Request<ReqBody>, Response = http::Response<ResBody>>,
{
    type Response = http::Response<crate::body::CompressionBody<ResBody>>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // Scan Accept-Encoding on raw bytes; a non-UTF-8 value still parses.
        let accepted = req
            .headers()
            .get(http::header::ACCEPT_ENCODING)
            .is_some_and(|v| accept::accepts(v.as_bytes()));
        let head_request = req.method() == Method::HEAD;

        let inner = self.inner.call(req);

        ResponseFuture::new(inner, accepted, head_request, self.config.clone())
    }
}
