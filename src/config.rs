use crate::encode::{MAX_QUALITY, MAX_WINDOW_BITS, MIN_WINDOW_BITS};
use thiserror::Error;

/// Default Brotli quality level.
pub const DEFAULT_QUALITY: u32 = 6;

/// Default maximum window, in bits (4 MiB).
pub const DEFAULT_WINDOW_BITS: u32 = 22;

/// Default minimum declared response length eligible for compression.
pub const DEFAULT_MIN_LENGTH: u64 = 20;

/// Error returned for a window size that is not a supported power of two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid window size {0}: must be a power of two between 1k and 16m")]
pub struct InvalidWindow(pub usize);

/// Compression policy and encoder tuning.
///
/// Built with chained setters and handed to
/// [`CompressionLayer::with`](crate::CompressionLayer::with).
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) quality: u32,
    pub(crate) window_bits: u32,
    pub(crate) min_length: u64,
    pub(crate) types: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            window_bits: DEFAULT_WINDOW_BITS,
            min_length: DEFAULT_MIN_LENGTH,
            types: vec!["text/html".to_string()],
        }
    }
}

impl Config {
    /// Creates a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the Brotli quality level, clamped to the supported `0..=11` range.
    pub fn quality(mut self, quality: u32) -> Self {
        self.quality = quality.min(MAX_QUALITY);
        self
    }

    /// Sets the maximum compression window as a power-of-two byte size.
    ///
    /// The size is validated and translated to a bit width here, at
    /// configuration time; supported sizes run from 1 KiB to 16 MiB.
    pub fn window(mut self, bytes: usize) -> Result<Self, InvalidWindow> {
        self.window_bits = window_bits(bytes).ok_or(InvalidWindow(bytes))?;
        Ok(self)
    }

    /// Sets the minimum declared response length eligible for compression.
    ///
    /// Responses with a known `Content-Length` below this are left alone;
    /// responses of unknown length are always eligible.
    pub fn min_length(mut self, length: u64) -> Self {
        self.min_length = length;
        self
    }

    /// Replaces the MIME type allow-list.
    ///
    /// Types are matched against the `Content-Type` essence (up to any `;`),
    /// case-insensitively. The default list contains only `text/html`.
    pub fn types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types = types.into_iter().map(Into::into).collect();
        self
    }
}

/// Translates a power-of-two window size in bytes to Brotli window bits.
pub(crate) fn window_bits(bytes: usize) -> Option<u32> {
    (MIN_WINDOW_BITS..=MAX_WINDOW_BITS).find(|bits| bytes == 1usize << bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_bits_accepts_powers_of_two() {
        assert_eq!(window_bits(1024), Some(10));
        assert_eq!(window_bits(4 * 1024 * 1024), Some(22));
        assert_eq!(window_bits(16 * 1024 * 1024), Some(24));
    }

    #[test]
    fn test_window_bits_rejects_out_of_range() {
        // Below 1 KiB and above 16 MiB are outside the Brotli window range.
        assert_eq!(window_bits(512), None);
        assert_eq!(window_bits(32 * 1024 * 1024), None);
    }

    #[test]
    fn test_window_bits_rejects_non_powers() {
        assert_eq!(window_bits(0), None);
        assert_eq!(window_bits(1536), None);
        assert_eq!(window_bits(1000), None);
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.quality, 6);
        assert_eq!(config.window_bits, 22);
        assert_eq!(config.min_length, 20);
        assert_eq!(config.types, vec!["text/html".to_string()]);
    }

    #[test]
    fn test_quality_clamped() {
        assert_eq!(Config::new().quality(99).quality, 11);
        assert_eq!(Config::new().quality(4).quality, 4);
    }

    #[test]
    fn test_window_setter() {
        let config = Config::new().window(1024).unwrap();
        assert_eq!(config.window_bits, 10);
        assert_eq!(
            Config::new().window(1000).unwrap_err(),
            InvalidWindow(1000)
        );
    }

    #[test]
    fn test_types_setter() {
        let config = Config::new().types(["text/html", "application/json"]);
        assert_eq!(config.types.len(), 2);
    }
}
