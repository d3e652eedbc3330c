use crate::config::Config;
use crate::service::CompressionService;
use tower::Layer;

/// A Tower layer that compresses HTTP response bodies with Brotli.
///
/// This layer wraps services and compresses eligible response bodies when
/// the client's Accept-Encoding header admits the `br` encoding.
#[derive(Debug, Clone)]
pub struct CompressionLayer {
    config: Config,
}

impl CompressionLayer {
    /// Creates a new compression layer with default settings.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Creates a layer from a prepared [`Config`].
    pub fn with(config: Config) -> Self {
        Self { config }
    }

    /// Sets the Brotli quality level, clamped to the supported `0..=11`.
    pub fn quality(mut self, quality: u32) -> Self {
        self.config = self.config.quality(quality);
        self
    }

    /// Sets the minimum declared body size required for compression.
    ///
    /// Responses with a known Content-Length smaller than this value
    /// will not be compressed.
    pub fn min_length(mut self, length: u64) -> Self {
        self.config = self.config.min_length(length);
        self
    }
}

impl Default for CompressionLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for CompressionLayer {
    type Service = CompressionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CompressionService::new(inner, self.config.clone())
    }
}
