//! Response writers and the compressing decorator.
//!
//! [`ResponseWriter`] is the sink a handler writes a response into: a header
//! map, a one-shot status, and an [`io::Write`] body. Transports may also
//! offer optional capabilities (server push, connection takeover, close
//! notification) through the `*er()` accessors, which default to `None`.
//!
//! [`CompressResponseWriter`] wraps any such sink and compresses everything
//! written to it, while still behaving as a [`ResponseWriter`] itself.

use crate::accept::negotiate_encoding;
use crate::codec::{Compressor, Encoding};
use crate::error::Result;
use crate::headers::add_compress_headers;
use crate::sniff;
use http::header::{self, HeaderMap, HeaderValue};
use http::StatusCode;
use std::io::{self, Read, Write};
use std::sync::mpsc;

/// A sink for an HTTP response.
pub trait ResponseWriter: Write {
    /// Returns the response headers.
    fn headers(&self) -> &HeaderMap;

    /// Returns the response headers for modification. Changes made after the
    /// status was sent do not reach the client.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Sends the status line and the headers. Only the first call has an
    /// effect.
    fn write_status(&mut self, status: StatusCode);

    /// Server push support, if the transport has it.
    fn pusher(&mut self) -> Option<&mut dyn Pusher> {
        None
    }

    /// Connection takeover support, if the transport has it.
    fn hijacker(&mut self) -> Option<&mut dyn Hijacker> {
        None
    }

    /// Client disconnect notification, if the transport has it.
    fn close_notifier(&mut self) -> Option<&mut dyn CloseNotifier> {
        None
    }
}

/// Initiates server pushes.
pub trait Pusher {
    /// Pushes `target` to the client with the given request headers.
    fn push(&mut self, target: &str, headers: &HeaderMap) -> io::Result<()>;
}

/// A raw, bidirectional connection.
pub trait Connection: Read + Write + Send {}

impl<T: Read + Write + Send> Connection for T {}

/// Hands the underlying connection over to the caller.
pub trait Hijacker {
    /// Takes over the connection. The response writer must not be used
    /// afterwards.
    fn hijack(&mut self) -> io::Result<Box<dyn Connection>>;
}

/// Notifies when the client goes away.
pub trait CloseNotifier {
    /// Returns a receiver that gets a message once the client disconnects.
    fn close_notify(&mut self) -> mpsc::Receiver<()>;
}

impl<W: ResponseWriter + ?Sized> ResponseWriter for &mut W {
    fn headers(&self) -> &HeaderMap {
        (**self).headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        (**self).headers_mut()
    }

    fn write_status(&mut self, status: StatusCode) {
        (**self).write_status(status)
    }

    fn pusher(&mut self) -> Option<&mut dyn Pusher> {
        (**self).pusher()
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijacker> {
        (**self).hijacker()
    }

    fn close_notifier(&mut self) -> Option<&mut dyn CloseNotifier> {
        (**self).close_notifier()
    }
}

/// Lifecycle of a [`CompressResponseWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// Nothing has been sent yet; headers may still change.
    Unstarted,
    /// The status and headers went out.
    HeaderSent,
    /// The compressed stream was finished.
    Closed,
}

/// Optional capabilities found on the wrapped sink.
#[derive(Debug, Clone, Copy, Default)]
struct Capabilities {
    push: bool,
    hijack: bool,
    close_notify: bool,
}

/// A [`ResponseWriter`] that compresses the body written through it.
///
/// Construct it with [`new`](Self::new) for each request and call
/// [`close`](Self::close) when the handler returns, on every path: the codec
/// trailer (checksums, end-of-stream markers) is only written on close.
/// Dropping the writer closes it as a last resort, discarding errors.
///
/// Pass `&mut sink` to keep access to the sink when construction fails. The
/// returned `Result` holds that borrow until it is dropped, so take the error
/// out first, for example with [`Result::err`].
pub struct CompressResponseWriter<W: ResponseWriter> {
    inner: W,
    compressor: Option<Compressor<Vec<u8>>>,
    encoding: Encoding,
    level: i32,
    auto_flush: bool,
    state: WriterState,
    content_type_decided: bool,
    capabilities: Capabilities,
}

impl<W: ResponseWriter> CompressResponseWriter<W> {
    /// Negotiates an encoding from the request's `Accept-Encoding` values and
    /// wraps `inner` to compress with it.
    ///
    /// Returns [`Error::ResponseNotCompressed`](crate::Error::ResponseNotCompressed)
    /// when the request has no `Accept-Encoding`, in which case the caller
    /// should write to `inner` directly. Returns
    /// [`Error::NotSupported`](crate::Error::NotSupported) when the client
    /// rejected every offer, or when nothing matched and only `identity`
    /// remains. On success the sink's `Content-Encoding` and `Vary` headers
    /// are set right away and `Content-Length` is removed.
    pub fn new(
        mut inner: W,
        request_headers: &HeaderMap,
        offers: &[Encoding],
        level: i32,
    ) -> Result<Self> {
        let encoding = negotiate_encoding(request_headers, offers)?;
        let compressor = Compressor::new(Vec::new(), encoding, level)?;

        add_compress_headers(inner.headers_mut(), encoding);

        let capabilities = Capabilities {
            push: inner.pusher().is_some(),
            hijack: inner.hijacker().is_some(),
            close_notify: inner.close_notifier().is_some(),
        };

        tracing::debug!(%encoding, level = compressor.level(), "compressing response");

        Ok(Self {
            inner,
            level: compressor.level(),
            compressor: Some(compressor),
            encoding,
            auto_flush: true,
            state: WriterState::Unstarted,
            content_type_decided: false,
            capabilities,
        })
    }

    /// Returns the negotiated encoding.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Returns the compression level in effect.
    pub fn level(&self) -> i32 {
        self.level
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Whether every write is followed by a flush of the compressor.
    pub fn auto_flush(&self) -> bool {
        self.auto_flush
    }

    /// Enables or disables flushing after every write (enabled by default).
    ///
    /// Flushing gets partial output to the client promptly at the cost of
    /// compression ratio.
    pub fn set_auto_flush(&mut self, auto_flush: bool) {
        self.auto_flush = auto_flush;
    }

    /// Returns a reference to the wrapped sink.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Returns a mutable reference to the wrapped sink.
    ///
    /// Writing to the sink directly corrupts the compressed body.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Finishes the compressed stream and flushes the sink.
    ///
    /// Sends a `200 OK` first if no status was sent. Calling `close` again
    /// does nothing.
    pub fn close(&mut self) -> io::Result<()> {
        let Some(compressor) = self.compressor.take() else {
            return Ok(());
        };

        let result = self.finish(compressor);
        self.state = WriterState::Closed;
        tracing::trace!(
            encoding = %self.encoding,
            ok = result.is_ok(),
            "closed compressed response"
        );
        result
    }

    fn finish(&mut self, compressor: Compressor<Vec<u8>>) -> io::Result<()> {
        // Some codecs emit nothing for an empty stream; the status still goes out.
        self.write_status(StatusCode::OK);
        let remaining = compressor.finish()?;
        if !remaining.is_empty() {
            self.inner.write_all(&remaining)?;
        }
        self.inner.flush()
    }

    /// Moves compressed output from the staging buffer to the sink.
    fn forward(&mut self) -> io::Result<()> {
        let has_output = self
            .compressor
            .as_ref()
            .is_some_and(|c| !c.get_ref().is_empty());
        if !has_output {
            return Ok(());
        }

        self.write_status(StatusCode::OK);
        if let Some(compressor) = self.compressor.as_mut() {
            let pending = compressor.get_mut();
            self.inner.write_all(pending)?;
            pending.clear();
        }
        Ok(())
    }

    /// Sniffs the Content-Type from the first chunk, once.
    fn decide_content_type(&mut self, first_chunk: &[u8]) {
        if self.content_type_decided {
            return;
        }
        self.content_type_decided = true;

        if self.state == WriterState::Unstarted
            && !self.inner.headers().contains_key(header::CONTENT_TYPE)
        {
            let content_type = sniff::detect_content_type(first_chunk);
            self.inner
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
    }
}

impl<W: ResponseWriter> Write for CompressResponseWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.state == WriterState::Closed {
            return Err(closed());
        }

        self.decide_content_type(buf);
        self.write_status(StatusCode::OK);

        let compressor = self.compressor.as_mut().ok_or_else(closed)?;
        let n = compressor.write(buf)?;
        if self.auto_flush {
            compressor.flush()?;
        }
        self.forward()?;
        Ok(n)
    }

    /// Flushes the compressor, then the sink.
    fn flush(&mut self) -> io::Result<()> {
        if let Some(compressor) = self.compressor.as_mut() {
            compressor.flush()?;
        }
        self.forward()?;
        self.inner.flush()
    }
}

impl<W: ResponseWriter> ResponseWriter for CompressResponseWriter<W> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    /// Sends the status once, dropping any `Content-Length` the handler set:
    /// it describes the uncompressed body.
    fn write_status(&mut self, status: StatusCode) {
        if self.state != WriterState::Unstarted {
            return;
        }
        self.state = WriterState::HeaderSent;
        self.inner.headers_mut().remove(header::CONTENT_LENGTH);
        self.inner.write_status(status);
    }

    fn pusher(&mut self) -> Option<&mut dyn Pusher> {
        if self.capabilities.push {
            self.inner.pusher()
        } else {
            None
        }
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijacker> {
        if self.capabilities.hijack {
            self.inner.hijacker()
        } else {
            None
        }
    }

    fn close_notifier(&mut self) -> Option<&mut dyn CloseNotifier> {
        if self.capabilities.close_notify {
            self.inner.close_notifier()
        } else {
            None
        }
    }
}

impl<W: ResponseWriter> Drop for CompressResponseWriter<W> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::debug!(error = %err, "failed to close compressed response on drop");
        }
    }
}

impl<W: ResponseWriter> std::fmt::Debug for CompressResponseWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressResponseWriter")
            .field("encoding", &self.encoding)
            .field("level", &self.level)
            .field("auto_flush", &self.auto_flush)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "compressed response already closed")
}
