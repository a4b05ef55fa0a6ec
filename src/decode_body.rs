use crate::codec::{Decompressor, Encoding};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use http::HeaderMap;
use http_body::{Body, Frame};
use pin_project_lite::pin_project;
use std::io::{self, Read};
use std::pin::Pin;
use std::task::{Context, Poll};

pin_project! {
    /// A request body that may be decompressed.
    ///
    /// The encoded body is collected in full, then decoded in one go, so a
    /// size limit applies to both the collected and the decoded bytes: bodies
    /// that would grow past it fail with [`io::ErrorKind::InvalidData`].
    #[project = DecompressionBodyProj]
    #[allow(missing_docs)]
    pub enum DecompressionBody<B> {
        /// Body being collected and decoded.
        Decoding {
            #[pin]
            inner: B,
            state: DecodingBody,
        },
        /// Body passed on as is.
        Passthrough {
            #[pin]
            inner: B,
        },
    }
}

pub(crate) struct DecodingBody {
    encoding: Encoding,
    max_size: usize,
    encoded: BytesMut,
    trailers: Option<HeaderMap>,
    state: DecodeState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Collecting,
    Trailers,
    Done,
}

impl DecodingBody {
    fn poll_decoded<B>(
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
                DecodeState::Done => return Poll::Ready(None),

                DecodeState::Trailers => {
                    self.state = DecodeState::Done;
                    return Poll::Ready(self.trailers.take().map(|t| Ok(Frame::trailers(t))));
                }

                DecodeState::Collecting => match inner.as_mut().poll_frame(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Some(Err(e))) => {
                        self.state = DecodeState::Done;
                        return Poll::Ready(Some(Err(io::Error::other(e.into()))));
                    }
                    Poll::Ready(Some(Ok(frame))) => match frame.into_data() {
                        Ok(data) => {
                            if self.encoded.len() + data.remaining() > self.max_size {
                                self.state = DecodeState::Done;
                                self.encoded = BytesMut::new();
                                return Poll::Ready(Some(Err(self.limit_exceeded("encoded"))));
                            }
                            self.encoded.put(data);
                        }
                        Err(frame) => {
                            if let Ok(trailers) = frame.into_trailers() {
                                self.trailers = Some(trailers);
                                return Poll::Ready(self.decode().transpose());
                            }
                        }
                    },
                    Poll::Ready(None) => return Poll::Ready(self.decode().transpose()),
                },
            }
        }
    }

    /// Decodes everything collected so far.
    fn decode(&mut self) -> io::Result<Option<Frame<Bytes>>> {
        self.state = DecodeState::Done;
        let encoded = std::mem::take(&mut self.encoded).freeze();
        let encoded_len = encoded.len();

        let decoder =
            Decompressor::new(encoded.reader(), self.encoding).map_err(io::Error::other)?;
        let mut decoded = Vec::new();
        decoder
            .take(self.max_size as u64 + 1)
            .read_to_end(&mut decoded)?;

        if decoded.len() > self.max_size {
            return Err(self.limit_exceeded("decompressed"));
        }

        tracing::trace!(
            encoding = %self.encoding,
            encoded_len,
            decoded_len = decoded.len(),
            "decompressed request body"
        );

        if decoded.is_empty() {
            return Ok(self.trailers.take().map(Frame::trailers));
        }
        self.state = DecodeState::Trailers;
        Ok(Some(Frame::data(Bytes::from(decoded))))
    }
}

impl DecodingBody {
    fn limit_exceeded(&self, stage: &str) -> io::Error {
        tracing::debug!(
            encoding = %self.encoding,
            max_size = self.max_size,
            stage,
            "request body exceeds decompression limit"
        );
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{stage} request body exceeds {} bytes", self.max_size),
        )
    }
}

impl<B> DecompressionBody<B> {
    /// Creates a body decoded from `encoding`, refusing to collect or decode
    /// more than `max_size` bytes.
    pub fn decoding(inner: B, encoding: Encoding, max_size: usize) -> Self {
        Self::Decoding {
            inner,
            state: DecodingBody {
                encoding,
                max_size,
                encoded: BytesMut::new(),
                trailers: None,
                state: DecodeState::Collecting,
            },
        }
    }

    /// Creates a passthrough body without decompression.
    pub fn passthrough(inner: B) -> Self {
        Self::Passthrough { inner }
    }
}

impl<B> Body for DecompressionBody<B>
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
            DecompressionBodyProj::Passthrough { inner } => match inner.poll_frame(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Ready(Some(Ok(frame))) => Poll::Ready(Some(Ok(
                    frame.map_data(|mut data| data.copy_to_bytes(data.remaining()))
                ))),
                Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(io::Error::other(e.into())))),
            },
            DecompressionBodyProj::Decoding { inner, state } => state.poll_decoded(cx, inner),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            DecompressionBody::Passthrough { inner } => inner.is_end_stream(),
            DecompressionBody::Decoding { state, .. } => state.state == DecodeState::Done,
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        match self {
            DecompressionBody::Passthrough { inner } => inner.size_hint(),
            DecompressionBody::Decoding { .. } => http_body::SizeHint::default(),
        }
    }
}
