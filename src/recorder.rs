use crate::writer::ResponseWriter;
use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Response, StatusCode};
use std::io::{self, Write};

/// An in-memory [`ResponseWriter`].
///
/// Records the status, a snapshot of the headers as they were when the status
/// was sent, the body, and how often it was flushed. Useful for running
/// synchronous handlers and for tests.
#[derive(Debug, Default)]
pub struct ResponseRecorder {
    status: Option<StatusCode>,
    headers: HeaderMap,
    sent_headers: Option<HeaderMap>,
    body: BytesMut,
    flushes: usize,
}

impl ResponseRecorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// The status that was sent, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// The headers as they were when the status was sent.
    pub fn sent_headers(&self) -> Option<&HeaderMap> {
        self.sent_headers.as_ref()
    }

    /// The body bytes written so far.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Number of times the recorder was flushed.
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// Converts the recording into a response.
    ///
    /// Uses the headers snapshotted when the status was sent, or the current
    /// headers if nothing was sent.
    pub fn into_response(self) -> Response<Bytes> {
        let mut response = Response::new(self.body.freeze());
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = self.sent_headers.unwrap_or(self.headers);
        response
    }
}

impl Write for ResponseRecorder {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.status.is_none() {
            self.write_status(StatusCode::OK);
        }
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        Ok(())
    }
}

impl ResponseWriter for ResponseRecorder {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
            self.sent_headers = Some(self.headers.clone());
        }
    }
}
