//! The response sink every stage writes to, and an in-memory implementation.
//!
//! Handlers do not return a response value. They write into a
//! [`ResponseWriter`]: status first, then body bytes in as many pieces as
//! they like. Stages that need to see what was written (the access logger)
//! wrap the sink they were given in their own `ResponseWriter` and pass that
//! downstream.

use std::io;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use tracing::debug;

// ── ResponseWriter ────────────────────────────────────────────────────────────

/// Write side of one HTTP response.
///
/// Semantics every implementation keeps:
///
/// - the first [`write_status`](Self::write_status) wins; later calls are
///   accepted and ignored;
/// - the first [`write`](Self::write) without a prior status commits `200 OK`;
/// - headers changed after the status is committed have no effect on the wire.
pub trait ResponseWriter: Send {
    fn headers_mut(&mut self) -> &mut HeaderMap;

    fn write_status(&mut self, status: StatusCode);

    /// Appends body bytes, returning how many were accepted.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
}

// ── ResponseRecorder ──────────────────────────────────────────────────────────

/// Buffers a whole response in memory.
///
/// The server adapter runs every request against one of these and converts it
/// into an `http::Response` afterwards. Tests use it to inspect what a
/// pipeline wrote.
///
/// ```rust
/// use http::StatusCode;
/// use strata::{ResponseRecorder, ResponseWriter};
///
/// let mut rec = ResponseRecorder::new();
/// rec.write(b"partial ").unwrap();
/// rec.write_status(StatusCode::NOT_FOUND); // too late: 200 already committed
/// rec.write(b"body").unwrap();
///
/// assert_eq!(rec.status(), StatusCode::OK);
/// assert_eq!(rec.body(), b"partial body");
/// ```
#[derive(Debug, Default)]
pub struct ResponseRecorder {
    status: Option<StatusCode>,
    headers: HeaderMap,
    // Headers as they were when the status was committed.
    sent_headers: Option<HeaderMap>,
    body: BytesMut,
}

impl ResponseRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The committed status, `200 OK` if nothing was written.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    /// The headers that go out with the response: a snapshot taken when the
    /// status was committed, or the live map if nothing was written yet.
    pub fn headers(&self) -> &HeaderMap {
        self.sent_headers.as_ref().unwrap_or(&self.headers)
    }

    pub fn body(&self) -> &[u8] { &self.body }

    /// The body as UTF-8, lossily.
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn into_response(self) -> http::Response<Full<Bytes>> {
        let mut response = http::Response::new(Full::new(self.body.freeze()));
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = self.sent_headers.unwrap_or(self.headers);
        response
    }

    fn commit(&mut self, status: StatusCode) {
        self.status = Some(status);
        self.sent_headers = Some(self.headers.clone());
    }
}

impl ResponseWriter for ResponseRecorder {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) {
        match self.status {
            Some(committed) => {
                debug!(%committed, ignored = %status, "superfluous write_status call");
            }
            None => self.commit(status),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.status.is_none() {
            self.commit(StatusCode::OK);
        }
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_status_wins() {
        let mut rec = ResponseRecorder::new();
        rec.write_status(StatusCode::CREATED);
        rec.write_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(rec.status(), StatusCode::CREATED);
    }

    #[test]
    fn untouched_recorder_is_empty_ok() {
        let rec = ResponseRecorder::new();
        assert_eq!(rec.status(), StatusCode::OK);
        assert!(rec.body().is_empty());
    }

    #[test]
    fn into_response_carries_status_headers_and_body() {
        let mut rec = ResponseRecorder::new();
        rec.headers_mut().insert("content-type", "text/plain".parse().unwrap());
        rec.write_status(StatusCode::ACCEPTED);
        rec.write(b"queued").unwrap();

        let response = rec.into_response();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.headers()["content-type"], "text/plain");
    }

    #[test]
    fn headers_after_commit_are_not_sent() {
        let mut rec = ResponseRecorder::new();
        rec.headers_mut().insert("x-early", "yes".parse().unwrap());
        rec.write(b"body").unwrap();
        rec.headers_mut().insert("x-late", "yes".parse().unwrap());

        assert!(rec.headers().contains_key("x-early"));
        assert!(!rec.headers().contains_key("x-late"));
        let response = rec.into_response();
        assert!(response.headers().contains_key("x-early"));
        assert!(!response.headers().contains_key("x-late"));
    }
}
