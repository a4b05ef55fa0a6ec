//! Negotiated HTTP compression.
//!
//! This crate compresses responses with the best encoding a client accepts,
//! and decompresses request bodies sent with a `Content-Encoding`. Supported
//! encodings are `gzip`, `deflate`, `br`, `snappy` and `s2`.
//!
//! There are two ways to use it:
//!
//! - [`CompressionLayer`], a Tower middleware for `http` services.
//! - [`CompressResponseWriter`] and [`Reader`], which wrap synchronous
//!   [`ResponseWriter`] sinks and [`std::io::Read`] bodies directly.
//!
//! # Example
//!
//! ```ignore
//! use http_compress::{CompressionLayer, Encoding};
//! use tower::ServiceBuilder;
//!
//! let service = ServiceBuilder::new()
//!     .layer(CompressionLayer::new().offers([Encoding::Brotli, Encoding::Gzip]))
//!     .service(my_service);
//! ```
//!
//! # Negotiation
//!
//! `Accept-Encoding` is parsed leniently: malformed entries are skipped, the
//! rest still count. The offer with the highest quality wins, and among equal
//! qualities the one offered first. An explicit `q=0` rejects an encoding;
//! when nothing matches the response is sent uncompressed.
//!
//! # Response Modifications
//!
//! When compression is applied:
//! - `Content-Encoding` header is set to the encoding used
//! - `Content-Length` header is removed (compressed size is unknown)
//! - `Accept-Ranges` header is removed
//! - `Vary` header includes `Accept-Encoding`
//!
//! Responses that already carry a `Content-Encoding` are left alone.

#![deny(missing_docs)]

mod accept;
mod body;
mod codec;
mod decode_body;
mod error;
mod future;
mod headers;
mod layer;
mod reader;
mod recorder;
mod service;
pub mod sniff;
mod writer;

pub use accept::{AcceptSpec, negotiate, negotiate_encoding, parse_accept};
pub use body::CompressionBody;
pub use codec::{BROTLI_DEFAULT_LEVEL, Compressor, DEFAULT_LEVEL, Decompressor, Encoding};
pub use decode_body::DecompressionBody;
pub use error::{Error, Result};
pub use future::ResponseFuture;
pub use layer::{CompressionLayer, DEFAULT_MAX_DECOMPRESSED_SIZE};
pub use reader::{Reader, ReaderError};
pub use recorder::ResponseRecorder;
pub use service::CompressionService;
pub use writer::{
    CloseNotifier, CompressResponseWriter, Connection, Hijacker, Pusher, ResponseWriter,
    WriterState,
};
