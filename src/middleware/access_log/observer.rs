//! Response sink decorator recording what the access log needs.

use std::io::{self, Write};

use http::{HeaderMap, StatusCode};

use crate::response::ResponseWriter;

/// Wraps exactly one [`ResponseWriter`] and forwards every call to it
/// untouched, recording on the way:
///
/// - the first status written, `200` until then;
/// - the total number of body bytes the inner sink accepted;
/// - in capturing mode, the last body chunk the inner sink accepted while
///   the status is outside `2xx`.
///
/// Observers nest by wrapping one another explicitly; each sees only the sink
/// it was built with.
pub struct ResponseObserver<'a> {
    inner: &'a mut dyn ResponseWriter,
    status: StatusCode,
    committed: bool,
    size: usize,
    capture: bool,
    error_body: Vec<u8>,
}

impl<'a> ResponseObserver<'a> {
    pub fn new(inner: &'a mut dyn ResponseWriter) -> Self {
        Self {
            inner,
            status: StatusCode::OK,
            committed: false,
            size: 0,
            capture: false,
            error_body: Vec::new(),
        }
    }

    /// Also keep the last body chunk of non-`2xx` responses.
    pub fn capturing(inner: &'a mut dyn ResponseWriter) -> Self {
        Self { capture: true, ..Self::new(inner) }
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn size(&self) -> usize { self.size }

    /// The captured error payload; empty when nothing was captured.
    pub fn error_body(&self) -> &[u8] { &self.error_body }

    /// Appends `<status> <size>` and, if an error payload was captured,
    /// ` - <payload>` minus one trailing newline. Clears the captured payload.
    pub fn write_log_suffix(&mut self, buf: &mut Vec<u8>) {
        // Writing into a Vec cannot fail.
        let _ = write!(buf, "{} {}", self.status.as_u16(), self.size);
        if !self.error_body.is_empty() {
            buf.extend_from_slice(b" - ");
            let payload = self.error_body.strip_suffix(b"\n").unwrap_or(&self.error_body[..]);
            buf.extend_from_slice(payload);
            self.error_body.clear();
        }
    }
}

impl ResponseWriter for ResponseObserver<'_> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_status(&mut self, status: StatusCode) {
        if !self.committed {
            self.status = status;
            self.committed = true;
        }
        self.inner.write_status(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.committed = true;
        self.size += written;
        if self.capture && !self.status.is_success() {
            self.error_body.clear();
            self.error_body.extend_from_slice(&buf[..written]);
        }
        Ok(written)
    }
}
