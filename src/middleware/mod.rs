//! Built-in pipeline stages.
//!
//! Each constructor returns a [`Middleware`](crate::Middleware) ready to be
//! added to a [`Chain`](crate::Chain):
//!
//! - [`timeout`] / [`on_timeout`]: cooperative per-request deadlines
//! - [`logger`] / [`error_logger`] / [`AccessLog`]: one access-log line per
//!   request, written to a [`LogSink`]
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use strata::Chain;
//! use strata::middleware::{error_logger, timeout, TracingSink};
//!
//! let common = Chain::new([
//!     error_logger(TracingSink),
//!     timeout(Duration::from_secs(30)),
//! ]);
//! ```

mod access_log;
mod timeout;

pub use access_log::{
    AccessLog, BufferPool, DEFAULT_POOL_SIZE, LogSink, PooledBuf, ResponseObserver, TracingSink,
    WriterSink, error_logger, logger,
};
pub use timeout::{on_timeout, timeout};
