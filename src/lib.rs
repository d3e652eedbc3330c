//! Streaming Brotli compression middleware for Tower.
//!
//! This crate provides a Tower layer that compresses HTTP response bodies
//! with Brotli when the client's `Accept-Encoding` header admits the `br`
//! encoding, plus the lower-level building blocks it is made of: a
//! backpressure-aware compression [`Session`] driven chunk by chunk, and a
//! helper for serving pre-compressed `.br` files from disk.
//!
//! # Example
//!
//! ```ignore
//! use http_brotli_compression::CompressionLayer;
//! use tower::ServiceBuilder;
//!
//! let service = ServiceBuilder::new()
//!     .layer(CompressionLayer::new())
//!     .service(my_service);
//! ```
//!
//! # Compression Rules
//!
//! The middleware will **not** compress responses when:
//! - The request's `Accept-Encoding` does not admit `br` (a `q=0` weight
//!   counts as refusal)
//! - The request was a HEAD request
//! - The response status is not 200, 403, or 404
//! - `Content-Encoding` header is already set
//! - `Content-Range` header is present (range responses)
//! - `Content-Type` is not in the configured allow-list (default: `text/html`)
//! - `Content-Length` is below the minimum size threshold (default: 20 bytes)
//!
//! The middleware will **always flush** after each chunk when:
//! - `X-Accel-Buffering: no` header is present
//! - `Content-Type` is `text/event-stream`
//! - `Content-Type` starts with `application/grpc-web`
//!
//! # Response Modifications
//!
//! When compression is applied:
//! - `Content-Encoding` header is set to `br`
//! - `Content-Length` header is removed (compressed size is unknown)
//! - `Accept-Ranges` header is removed
//! - A strong `ETag` is weakened with a `W/` prefix
//! - `Vary` header includes `Accept-Encoding`

#![deny(missing_docs)]

mod accept;
mod body;
mod config;
mod encode;
mod error;
mod future;
mod layer;
pub mod precompressed;
mod service;
mod session;

pub use accept::{ENCODING, accepts};
pub use body::CompressionBody;
pub use config::{Config, InvalidWindow};
pub use error::{BoxError, Error};
pub use future::ResponseFuture;
pub use layer::CompressionLayer;
pub use service::CompressionService;
pub use session::{Chunk, Session, Sink, SinkStatus, Status};
