//! Apache-style access logging.
//!
//! One line per request, written after the inner handler returns:
//!
//! ```text
//! 10.0.0.7 - alice [16/Oct/2026:13:55:36 +0000] GET "/pies/42?crust=thin" HTTP/1.1 200 512
//! 10.0.0.7 - - [16/Oct/2026:13:55:37 +0000] POST "/pies" HTTP/1.1 422 27 - missing field `filling`
//! ```
//!
//! The trailing ` - …` segment appears only with [`error_logger`] and only
//! for non-`2xx` responses: it is the last body chunk the handler wrote.
//!
//! The stage never writes to the response itself. Lines are built in pooled
//! buffers so a steady request rate allocates nothing per request.
//!
//! ```rust
//! use strata::{Chain, middleware::{error_logger, TracingSink}};
//!
//! let chain = Chain::new([error_logger(TracingSink)]);
//! ```

mod observer;
mod pool;
mod sink;

use std::io::Write;
use std::sync::Arc;

use chrono::Local;

use crate::context::Context;
use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::request::Request;
use crate::response::ResponseWriter;
use crate::Middleware;

pub use observer::ResponseObserver;
pub use pool::{BufferPool, PooledBuf};
pub use sink::{LogSink, TracingSink, WriterSink};

/// Idle buffers kept per logger unless [`AccessLog::pool_size`] says otherwise.
pub const DEFAULT_POOL_SIZE: usize = 1024;

const TIMESTAMP_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

/// Logs method, target, protocol, status and size of every request.
pub fn logger(sink: impl LogSink) -> Middleware {
    AccessLog::new(sink).into_middleware()
}

/// Like [`logger`], plus the response payload of non-`2xx` responses.
pub fn error_logger(sink: impl LogSink) -> Middleware {
    AccessLog::new(sink).capture_errors(true).into_middleware()
}

/// Access-log stage configuration.
///
/// ```rust
/// use strata::middleware::{AccessLog, WriterSink};
///
/// let stage = AccessLog::new(WriterSink::new(std::io::stderr()))
///     .pool_size(64)
///     .capture_errors(true)
///     .into_middleware();
/// ```
pub struct AccessLog {
    sink: Arc<dyn LogSink>,
    pool_size: usize,
    capture_errors: bool,
}

impl AccessLog {
    pub fn new(sink: impl LogSink) -> Self {
        Self { sink: Arc::new(sink), pool_size: DEFAULT_POOL_SIZE, capture_errors: false }
    }

    /// Upper bound on idle line buffers kept between requests. More requests
    /// than this in flight still work; the extra buffers are allocated and
    /// dropped.
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    pub fn capture_errors(mut self, capture: bool) -> Self {
        self.capture_errors = capture;
        self
    }

    /// Every handler composed from the returned middleware shares one pool
    /// and one sink.
    pub fn into_middleware(self) -> Middleware {
        let shared = Arc::new(Shared {
            pool: BufferPool::new(self.pool_size),
            sink: self.sink,
            capture_errors: self.capture_errors,
        });
        Middleware::contextual(move |next| -> BoxedHandler {
            Arc::new(AccessLogStage { shared: Arc::clone(&shared), next })
        })
    }
}

struct Shared {
    pool: BufferPool,
    sink: Arc<dyn LogSink>,
    capture_errors: bool,
}

struct AccessLogStage {
    shared: Arc<Shared>,
    next: BoxedHandler,
}

impl Handler for AccessLogStage {
    fn serve<'a>(
        &'a self,
        ctx: Context,
        resp: &'a mut dyn ResponseWriter,
        req: &'a Request,
    ) -> BoxFuture<'a> {
        Box::pin(async move {
            let shared = &*self.shared;
            let mut line = shared.pool.get();
            write_prefix(&mut line, req);

            let mut observer = if shared.capture_errors {
                ResponseObserver::capturing(resp)
            } else {
                ResponseObserver::new(resp)
            };
            self.next.serve(ctx, &mut observer, req).await;

            observer.write_log_suffix(&mut line);
            shared.sink.write_line(&line);
        })
    }
}

/// `<client> - <user> [<time>] <method> "<target>" <protocol> `
fn write_prefix(buf: &mut Vec<u8>, req: &Request) {
    buf.extend_from_slice(req.client_host().as_bytes());
    buf.extend_from_slice(b" - ");
    match req.user() {
        Some(user) => buf.extend_from_slice(user.as_bytes()),
        None => buf.push(b'-'),
    }
    // Writing into a Vec cannot fail.
    let _ = write!(
        buf,
        " [{}] {} \"{}\" {:?} ",
        Local::now().format(TIMESTAMP_FORMAT),
        req.method(),
        req.request_uri(),
        req.version(),
    );
}
