use crate::codec::Encoding;
use thiserror::Error;

/// Errors returned while setting up compression or decompression.
///
/// Each variant carries its own handling policy, so callers are expected to
/// `match` on the variant rather than inspect the message.
#[derive(Debug, Error)]
pub enum Error {
    /// The request carried no `Accept-Encoding` header. The caller should keep
    /// writing to the original, uncompressed sink.
    #[error("compress: response will not be compressed")]
    ResponseNotCompressed,

    /// The request body has no `Content-Encoding` or there is no body at all.
    /// The caller should read the original body.
    #[error("compress: request is not compressed")]
    RequestNotCompressed,

    /// The encoding is unknown to the registry, reserved (`identity`), or was
    /// explicitly rejected by the client with `q=0`.
    #[error("compress: unsupported compression: {0}")]
    NotSupported(String),

    /// The codec refused the requested compression level.
    #[error("compress: invalid compression level {level} for {encoding}")]
    InvalidLevel {
        /// Encoding the level was requested for.
        encoding: Encoding,
        /// The rejected level.
        level: i32,
    },
}

/// Result type for compression setup.
pub type Result<T> = std::result::Result<T, Error>;
