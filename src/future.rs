use crate::body::CompressionBody;
use crate::codec::{Compressor, Encoding};
use crate::headers::add_compress_headers;
use http::{Response, header};
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

pin_project! {
    /// Future for compression service responses.
    pub struct ResponseFuture<F> {
        #[pin]
        inner: F,
        encoding: Option<Encoding>,
        level: i32,
        auto_flush: bool,
    }
}

impl<F> ResponseFuture<F> {
    pub(crate) fn new(inner: F, encoding: Option<Encoding>, level: i32, auto_flush: bool) -> Self {
        Self {
            inner,
            encoding,
            level,
            auto_flush,
        }
    }
}

impl<F, B, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<Response<B>, E>>,
{
    type Output = Result<Response<CompressionBody<B>>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        match this.inner.poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Ready(Ok(response)) => Poll::Ready(Ok(wrap_response(
                response,
                *this.encoding,
                *this.level,
                *this.auto_flush,
            ))),
        }
    }
}

/// Wraps the response body with compression if a codec was negotiated and
/// the handler did not encode the body itself.
fn wrap_response<B>(
    response: Response<B>,
    encoding: Option<Encoding>,
    level: i32,
    auto_flush: bool,
) -> Response<CompressionBody<B>> {
    let (mut parts, body) = response.into_parts();

    let Some(encoding) = encoding else {
        return Response::from_parts(parts, CompressionBody::passthrough(body));
    };

    if parts.headers.contains_key(header::CONTENT_ENCODING) {
        tracing::debug!(%encoding, "response already encoded, not compressing");
        return Response::from_parts(parts, CompressionBody::passthrough(body));
    }

    let body = match Compressor::new(Vec::new(), encoding, level) {
        Ok(compressor) => {
            add_compress_headers(&mut parts.headers, encoding);
            tracing::trace!(%encoding, level = compressor.level(), "compressing response");
            CompressionBody::compressed(body, compressor, auto_flush)
        }
        Err(err) => {
            tracing::warn!(%err, "failed to set up response compression");
            CompressionBody::passthrough(body)
        }
    };

    Response::from_parts(parts, body)
}
