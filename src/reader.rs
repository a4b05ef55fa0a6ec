//! Decompression of request bodies.
//!
//! A [`Reader`] owns both the decoder and the original body. Closing it drops
//! them together, exactly once, which is also how sources without a close
//! operation of their own are handled: there is nothing separate to close.

use crate::codec::{Decompressor, Encoding};
use crate::error::Error;
use std::fmt;
use std::io::{self, Read};

/// A request body that is decompressed as it is read.
pub struct Reader<R: Read> {
    inner: Option<Decompressor<R>>,
    encoding: Encoding,
}

impl<R: Read> Reader<R> {
    /// Wraps `source`, which is encoded with the `Content-Encoding` token
    /// `encoding`.
    ///
    /// Fails with [`Error::RequestNotCompressed`] when `encoding` is empty or
    /// there is no body, and with [`Error::NotSupported`] when the encoding is
    /// unknown or `identity`. The untouched source comes back in the error so
    /// the caller can keep reading it as is.
    pub fn new(source: Option<R>, encoding: &str) -> Result<Self, ReaderError<R>> {
        let source = match source {
            Some(source) if !encoding.is_empty() => source,
            source => {
                return Err(ReaderError {
                    error: Error::RequestNotCompressed,
                    source,
                });
            }
        };

        let parsed = match encoding.parse::<Encoding>() {
            Ok(Encoding::Identity) => Err(Error::NotSupported(encoding.to_owned())),
            other => other,
        };
        let encoding = match parsed {
            Ok(encoding) => encoding,
            Err(error) => {
                return Err(ReaderError {
                    error,
                    source: Some(source),
                });
            }
        };

        let inner = Decompressor::new(source, encoding)
            .map_err(|error| ReaderError { error, source: None })?;

        tracing::trace!(%encoding, "decompressing request body");

        Ok(Self {
            inner: Some(inner),
            encoding,
        })
    }

    /// Returns the encoding being decoded.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Releases the decoder and the original body. Later calls do nothing,
    /// and later reads fail.
    pub fn close(&mut self) {
        if self.inner.take().is_some() {
            tracing::trace!(encoding = %self.encoding, "closed request body");
        }
    }
}

impl<R: Read> Read for Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.as_mut() {
            Some(decoder) => decoder.read(buf),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "request body already closed",
            )),
        }
    }
}

impl<R: Read> fmt::Debug for Reader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader")
            .field("encoding", &self.encoding)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// The error from [`Reader::new`], holding the source that was not wrapped.
pub struct ReaderError<R> {
    error: Error,
    source: Option<R>,
}

impl<R> ReaderError<R> {
    /// Returns the reason the source was not wrapped.
    pub fn error(&self) -> &Error {
        &self.error
    }

    /// Returns the original source, unread.
    pub fn into_inner(self) -> Option<R> {
        self.source
    }

    /// Splits into the error and the original source.
    pub fn into_parts(self) -> (Error, Option<R>) {
        (self.error, self.source)
    }
}

impl<R> From<ReaderError<R>> for Error {
    fn from(err: ReaderError<R>) -> Self {
        err.error
    }
}

impl<R> fmt::Debug for ReaderError<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderError")
            .field("error", &self.error)
            .field("has_source", &self.source.is_some())
            .finish()
    }
}

impl<R> fmt::Display for ReaderError<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl<R> std::error::Error for ReaderError<R> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
