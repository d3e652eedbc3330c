use thiserror::Error;

/// Boxed error type used at the sink boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that terminate a compression session.
///
/// Every variant is fatal to the stream it occurs on: the session closes,
/// the encoder is torn down, and no partially compressed output is retried.
#[derive(Debug, Error)]
pub enum Error {
    /// The Brotli encoder could not be created.
    #[error("failed to create brotli encoder")]
    ResourceExhausted,

    /// The encoder rejected a compress/flush/finish call.
    #[error("brotli encoder rejected stream operation")]
    Encoding(#[source] BoxError),

    /// The encoder claimed output was available but yielded none.
    #[error("brotli encoder reported pending output but returned none")]
    InvariantViolation,

    /// The downstream sink reported a hard failure.
    #[error("downstream sink failed")]
    Sink(#[source] BoxError),
}
