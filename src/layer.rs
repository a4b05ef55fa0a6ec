use crate::codec::{DEFAULT_LEVEL, Encoding};
use crate::service::CompressionService;
use std::sync::Arc;
use tower::Layer;

/// Default limit for decoded request bodies (100 MiB).
pub const DEFAULT_MAX_DECOMPRESSED_SIZE: usize = 100 * 1024 * 1024;

/// Settings shared by every service a [`CompressionLayer`] produces.
#[derive(Debug, Clone)]
pub(crate) struct Config {
    pub(crate) level: i32,
    pub(crate) offers: Arc<[Encoding]>,
    pub(crate) auto_flush: bool,
    pub(crate) max_decompressed_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL,
            offers: Arc::from(Encoding::DEFAULT_OFFERS),
            auto_flush: true,
            max_decompressed_size: DEFAULT_MAX_DECOMPRESSED_SIZE,
        }
    }
}

/// A Tower layer that decompresses request bodies and compresses response
/// bodies.
///
/// Requests with a supported `Content-Encoding` are decoded before reaching
/// the inner service. Responses are compressed with the best encoding the
/// client's `Accept-Encoding` allows among the configured offers.
#[derive(Debug, Clone, Default)]
pub struct CompressionLayer {
    config: Config,
}

impl CompressionLayer {
    /// Creates a new compression layer with default settings.
    ///
    /// Offers `gzip, deflate, br, snappy, s2` in that order at each codec's
    /// default level, flushing after every body frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the compression level. `-1` selects each codec's default.
    ///
    /// A level the negotiated codec rejects leaves responses uncompressed.
    pub fn level(mut self, level: i32) -> Self {
        self.config.level = level;
        self
    }

    /// Sets the encodings offered to clients. Earlier offers win ties.
    pub fn offers(mut self, offers: impl Into<Arc<[Encoding]>>) -> Self {
        self.config.offers = offers.into();
        self
    }

    /// Sets whether the codec is flushed after every response body frame.
    ///
    /// Turning this off improves the compression ratio of bodies sent in many
    /// small frames, at the cost of holding output back.
    pub fn auto_flush(mut self, auto_flush: bool) -> Self {
        self.config.auto_flush = auto_flush;
        self
    }

    /// Sets the largest decoded request body accepted.
    pub fn max_decompressed_size(mut self, size: usize) -> Self {
        self.config.max_decompressed_size = size;
        self
    }
}

impl<S> Layer<S> for CompressionLayer {
    type Service = CompressionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CompressionService::new(inner, self.config.clone())
    }
}
