use crate::codec::Compressor;
use bytes::{Buf, Bytes};
use http::HeaderMap;
use http_body::{Body, Frame};
use pin_project_lite::pin_project;
use std::io::{self, Write};
use std::pin::Pin;
use std::task::{Context, Poll};

pin_project! {
    /// A response body that may be compressed.
    ///
    /// Either feeds every data frame of the inner body through a
    /// [`Compressor`], or passes the inner body through unchanged.
    #[project = CompressionBodyProj]
    #[allow(missing_docs)]
    pub enum CompressionBody<B> {
        /// Compressed body with its encoder.
        Compressed {
            #[pin]
            inner: B,
            state: CompressedBody,
        },
        /// Body sent as is.
        Passthrough {
            #[pin]
            inner: B,
        },
    }
}

/// Encoder and progress of an actively compressed body.
pub(crate) struct CompressedBody {
    compressor: Option<Compressor<Vec<u8>>>,
    auto_flush: bool,
    state: CompressState,
    pending_trailers: Option<HeaderMap>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompressState {
    /// Compressing frames from the inner body.
    Reading,
    /// Inner body is done; the codec trailer is still to be written.
    Finishing,
    /// Emitting buffered trailers.
    Trailers,
    Done,
}

impl CompressedBody {
    fn new(compressor: Compressor<Vec<u8>>, auto_flush: bool) -> Self {
        Self {
            compressor: Some(compressor),
            auto_flush,
            state: CompressState::Reading,
            pending_trailers: None,
        }
    }

    pub(crate) fn state(&self) -> CompressState {
        self.state
    }

    #[cfg(test)]
    pub(crate) fn auto_flush(&self) -> bool {
        self.auto_flush
    }

    fn poll_compressed<B>(
        &mut self,
        cx: &mut Context<'_>,
        mut inner: Pin<&mut B>,
    ) -> Poll<Option<Result<Frame<Bytes>, io::Error>>>
    where
        B: Body,
        B::Data: Buf,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        loop {
            match self.state {
                CompressState::Done => return Poll::Ready(None),

                CompressState::Trailers => {
                    self.state = CompressState::Done;
                    return match self.pending_trailers.take() {
                        Some(trailers) => Poll::Ready(Some(Ok(Frame::trailers(trailers)))),
                        None => Poll::Ready(None),
                    };
                }

                CompressState::Finishing => {
                    self.state = CompressState::Trailers;
                    let Some(compressor) = self.compressor.take() else {
                        continue;
                    };
                    let encoding = compressor.encoding();
                    let rest = compressor.finish()?;
                    tracing::trace!(%encoding, "finished compressed response body");
                    if !rest.is_empty() {
                        return Poll::Ready(Some(Ok(Frame::data(Bytes::from(rest)))));
                    }
                }

                CompressState::Reading => {
                    let frame = match inner.as_mut().poll_frame(cx) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(None) => {
                            self.state = CompressState::Finishing;
                            continue;
                        }
                        Poll::Ready(Some(Err(e))) => {
                            return Poll::Ready(Some(Err(io::Error::other(e.into()))));
                        }
                        Poll::Ready(Some(Ok(frame))) => frame,
                    };

                    match frame.into_data() {
                        Ok(data) => {
                            if let Some(out) = self.compress_chunk(data)? {
                                return Poll::Ready(Some(Ok(Frame::data(out))));
                            }
                            // The codec buffered everything; keep reading.
                        }
                        Err(frame) => {
                            if let Ok(trailers) = frame.into_trailers() {
                                self.pending_trailers = Some(trailers);
                                self.state = CompressState::Finishing;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Compresses `data`, returning whatever output the codec produced.
    fn compress_chunk<D: Buf>(&mut self, mut data: D) -> io::Result<Option<Bytes>> {
        let Some(compressor) = self.compressor.as_mut() else {
            return Ok(None);
        };

        while data.has_remaining() {
            let chunk = data.chunk();
            compressor.write_all(chunk)?;
            let len = chunk.len();
            data.advance(len);
        }
        if self.auto_flush {
            compressor.flush()?;
        }

        let out = std::mem::take(compressor.get_mut());
        Ok((!out.is_empty()).then(|| Bytes::from(out)))
    }
}

impl<B> CompressionBody<B> {
    /// Creates a body compressed by `compressor`, flushing the codec after
    /// every data frame when `auto_flush` is set.
    pub fn compressed(inner: B, compressor: Compressor<Vec<u8>>, auto_flush: bool) -> Self {
        Self::Compressed {
            inner,
            state: CompressedBody::new(compressor, auto_flush),
        }
    }

    /// Creates a passthrough body without compression.
    pub fn passthrough(inner: B) -> Self {
        Self::Passthrough { inner }
    }
}

impl<B> Body for CompressionBody<B>
where
    B: Body,
    B::Data: Buf,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            CompressionBodyProj::Passthrough { inner } => match inner.poll_frame(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Ready(Some(Ok(frame))) => Poll::Ready(Some(Ok(
                    frame.map_data(|mut data| data.copy_to_bytes(data.remaining()))
                ))),
                Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(io::Error::other(e.into())))),
            },
            CompressionBodyProj::Compressed { inner, state } => state.poll_compressed(cx, inner),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            CompressionBody::Passthrough { inner } => inner.is_end_stream(),
            CompressionBody::Compressed { state, .. } => state.state() == CompressState::Done,
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        match self {
            CompressionBody::Passthrough { inner } => inner.size_hint(),
            // Compressed size is unknown
            CompressionBody::Compressed { .. } => http_body::SizeHint::default(),
        }
    }
}
