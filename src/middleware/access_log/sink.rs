//! Destinations for finished access-log lines.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

/// Receives one complete line per request, without a trailing newline.
///
/// Called concurrently from every in-flight request. Implementations must not
/// interleave the bytes of two lines.
pub trait LogSink: Send + Sync + 'static {
    fn write_line(&self, line: &[u8]);
}

impl<S: LogSink + ?Sized> LogSink for Arc<S> {
    fn write_line(&self, line: &[u8]) {
        (**self).write_line(line);
    }
}

/// Emits each line as one `tracing` event at `INFO`, target `access_log`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write_line(&self, line: &[u8]) {
        info!(target: "access_log", "{}", String::from_utf8_lossy(line));
    }
}

/// Appends lines to any [`Write`] (a file, stdout, a `Vec<u8>`), one `\n`
/// terminated line at a time under a lock.
pub struct WriterSink<W> {
    out: Mutex<W>,
}

impl<W: Write + Send + 'static> WriterSink<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    /// Gives the writer back, e.g. to inspect what was logged.
    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write + Send + 'static> LogSink for WriterSink<W> {
    fn write_line(&self, line: &[u8]) {
        let mut out = self.out.lock();
        if let Err(e) = out.write_all(line).and_then(|()| out.write_all(b"\n")) {
            warn!("access log write failed: {e}");
        }
    }
}
