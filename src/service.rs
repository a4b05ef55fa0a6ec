use crate::accept::negotiate_encoding;
use crate::body::CompressionBody;
use crate::codec::Encoding;
use crate::decode_body::DecompressionBody;
use crate::error::Error;
use crate::future::ResponseFuture;
use crate::layer::Config;
use http::{HeaderMap, Request, header};
use std::task::{Context, Poll};
use tower::Service;

/// A Tower service that decompresses request bodies and compresses response
/// bodies.
#[derive(Debug, Clone)]
pub struct CompressionService<S> {
    inner: S,
    config: Config,
}

impl<S> CompressionService<S> {
    pub(crate) fn new(inner: S, config: Config) -> Self {
        Self { inner, config }
    }

    /// Returns a reference to the inner service.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Returns a mutable reference to the inner service.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Consumes this service, returning the inner service.
    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Picks the response encoding, or `None` to send the response as is.
    fn response_encoding(&self, headers: &mut HeaderMap) -> Option<Encoding> {
        match negotiate_encoding(headers, &self.config.offers) {
            Ok(Encoding::Identity) => {
                tracing::debug!("no offered encoding accepted, not compressing");
                None
            }
            Ok(encoding) => {
                // Inner layers must not compress the body a second time.
                headers.remove(header::ACCEPT_ENCODING);
                Some(encoding)
            }
            Err(Error::ResponseNotCompressed) => None,
            Err(err) => {
                tracing::debug!(%err, "not compressing response");
                None
            }
        }
    }
}

/// Wraps `body` for decoding if `headers` name an encoding we can decode.
fn request_body<B>(headers: &mut HeaderMap, body: B, max_size: usize) -> DecompressionBody<B> {
    let parsed = headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| v.parse::<Encoding>());

    match parsed {
        None => DecompressionBody::passthrough(body),
        Some(Ok(encoding)) if encoding != Encoding::Identity => {
            headers.remove(header::CONTENT_ENCODING);
            headers.remove(header::CONTENT_LENGTH);
            DecompressionBody::decoding(body, encoding, max_size)
        }
        Some(Ok(_)) => DecompressionBody::passthrough(body),
        Some(Err(err)) => {
            tracing::debug!(%err, "request body left encoded");
            DecompressionBody::passthrough(body)
        }
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for CompressionService<S>
where
    S: Service<Request<DecompressionBody<ReqBody>>, Response = http::Response<ResBody>>,
{
    type Response = http::Response<CompressionBody<ResBody>>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let (mut parts, body) = req.into_parts();

        let body = request_body(&mut parts.headers, body, self.config.max_decompressed_size);
        let encoding = self.response_encoding(&mut parts.headers);

        let inner = self.inner.call(Request::from_parts(parts, body));

        ResponseFuture::new(inner, encoding, self.config.level, self.config.auto_flush)
    }
}

#[cfg(test)]
mod tests {
    use crate::codec::{Compressor, DEFAULT_LEVEL, Decompressor, Encoding};
    use crate::layer::CompressionLayer;
    use bytes::Bytes;
    use http::{Request, Response, header};
    use http_body_util::{BodyExt, Full};
    use std::io::{self, Read, Write};
    use tower::{Layer, ServiceExt, service_fn};

    type TestRequest = Request<crate::DecompressionBody<Full<Bytes>>>;

    const PAYLOAD: &str = "a response body that is long enough to be worth compressing";

    /// Echoes the request body along with the headers the handler saw.
    async fn echo(req: TestRequest) -> Result<Response<Full<Bytes>>, io::Error> {
        let seen_accept = req.headers().contains_key(header::ACCEPT_ENCODING);
        let seen_encoding = req.headers().contains_key(header::CONTENT_ENCODING);
        let body = req.into_body().collect().await?.to_bytes();

        let mut response = Response::new(Full::new(body));
        response.headers_mut().insert(
            "x-saw-accept-encoding",
            seen_accept.to_string().parse().unwrap(),
        );
        response.headers_mut().insert(
            "x-saw-content-encoding",
            seen_encoding.to_string().parse().unwrap(),
        );
        Ok(response)
    }

    async fn hello(_req: TestRequest) -> Result<Response<Full<Bytes>>, io::Error> {
        Ok(Response::new(Full::new(Bytes::from(PAYLOAD))))
    }

    fn encode(encoding: Encoding, data: &[u8]) -> Vec<u8> {
        let mut compressor = Compressor::new(Vec::new(), encoding, DEFAULT_LEVEL).unwrap();
        compressor.write_all(data).unwrap();
        compressor.finish().unwrap()
    }

    fn decode(encoding: Encoding, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        Decompressor::new(data, encoding)
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        out
    }

    fn request(
        headers: &[(&'static str, &'static str)],
        body: impl Into<Bytes>,
    ) -> Request<Full<Bytes>> {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Full::new(body.into())).unwrap()
    }

    #[tokio::test]
    async fn test_compresses_response() {
        let service = CompressionLayer::new().layer(service_fn(echo));
        let req = request(&[("accept-encoding", "gzip")], PAYLOAD);

        let response = service.oneshot(req).await.unwrap();
        let headers = response.headers().clone();
        assert_eq!(headers.get(header::CONTENT_ENCODING).unwrap(), "gzip");
        assert_eq!(headers.get(header::VARY).unwrap(), "Accept-Encoding");
        assert_eq!(headers.get("x-saw-accept-encoding").unwrap(), "false");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(decode(Encoding::Gzip, &body), PAYLOAD.as_bytes());
    }

    #[tokio::test]
    async fn test_prefers_higher_quality() {
        let service = CompressionLayer::new().layer(service_fn(hello));
        let req = request(&[("accept-encoding", "gzip;q=0.5, br;q=0.8")], "");

        let response = service.oneshot(req).await.unwrap();
        assert_eq!(response.headers().get(header::CONTENT_ENCODING).unwrap(), "br");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(decode(Encoding::Brotli, &body), PAYLOAD.as_bytes());
    }

    #[tokio::test]
    async fn test_no_accept_encoding_passes_through() {
        let service = CompressionLayer::new().layer(service_fn(hello));

        let response = service.oneshot(request(&[], "")).await.unwrap();
        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
        assert!(response.headers().get(header::VARY).is_none());

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, PAYLOAD);
    }

    #[tokio::test]
    async fn test_rejected_encoding_passes_through() {
        let service = CompressionLayer::new().layer(service_fn(echo));
        let req = request(&[("accept-encoding", "gzip;q=0")], PAYLOAD);

        let response = service.oneshot(req).await.unwrap();
        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
        // Nothing was negotiated, so the header reaches the handler.
        assert_eq!(
            response.headers().get("x-saw-accept-encoding").unwrap(),
            "true"
        );
    }

    #[tokio::test]
    async fn test_identity_only_passes_through() {
        let service = CompressionLayer::new().layer(service_fn(hello));
        let req = request(&[("accept-encoding", "zstd")], "");

        let response = service.oneshot(req).await.unwrap();
        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
    }

    #[tokio::test]
    async fn test_offers_restrict_choice() {
        let service = CompressionLayer::new()
            .offers([Encoding::Snappy])
            .layer(service_fn(hello));
        let req = request(&[("accept-encoding", "gzip, snappy;q=0.2")], "");

        let response = service.oneshot(req).await.unwrap();
        assert_eq!(
            response.headers().get(header::CONTENT_ENCODING).unwrap(),
            "snappy"
        );

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(decode(Encoding::Snappy, &body), PAYLOAD.as_bytes());
    }

    #[tokio::test]
    async fn test_invalid_level_passes_through() {
        let service = CompressionLayer::new().level(12).layer(service_fn(hello));
        let req = request(&[("accept-encoding", "br")], "");

        let response = service.oneshot(req).await.unwrap();
        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, PAYLOAD);
    }

    #[tokio::test]
    async fn test_decompresses_request() {
        let service = CompressionLayer::new().layer(service_fn(echo));
        let req = request(
            &[("content-encoding", "deflate"), ("content-length", "17")],
            encode(Encoding::Deflate, b"compressed upload"),
        );

        let response = service.oneshot(req).await.unwrap();
        assert_eq!(
            response.headers().get("x-saw-content-encoding").unwrap(),
            "false"
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, "compressed upload");
    }

    #[tokio::test]
    async fn test_unknown_request_encoding_passes_through() {
        let service = CompressionLayer::new().layer(service_fn(echo));
        let req = request(&[("content-encoding", "zstd")], "still encoded");

        let response = service.oneshot(req).await.unwrap();
        assert_eq!(
            response.headers().get("x-saw-content-encoding").unwrap(),
            "true"
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, "still encoded");
    }

    #[tokio::test]
    async fn test_request_limit_enforced() {
        let service = CompressionLayer::new()
            .max_decompressed_size(64)
            .layer(service_fn(echo));
        let req = request(
            &[("content-encoding", "gzip")],
            encode(Encoding::Gzip, &[b'x'; 1024]),
        );

        let Err(err) = service.oneshot(req).await else {
            panic!("Expected the oversized body to fail");
        };
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_already_encoded_response_untouched() {
        let service = CompressionLayer::new().layer(service_fn(|_req: TestRequest| async {
            let mut response = Response::new(Full::new(Bytes::from_static(b"precompressed")));
            response
                .headers_mut()
                .insert(header::CONTENT_ENCODING, "gzip".parse().unwrap());
            Ok::<_, io::Error>(response)
        }));
        let req = request(&[("accept-encoding", "br")], "");

        let response = service.oneshot(req).await.unwrap();
        assert_eq!(
            response.headers().get(header::CONTENT_ENCODING).unwrap(),
            "gzip"
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, "precompressed");
    }
}
