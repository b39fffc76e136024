//! Unified error type.

use std::fmt;
use std::io;
use std::net::SocketAddr;

/// Infrastructure failures of the server adapter.
///
/// Request-level failures never show up here: handlers report them by writing
/// an error status to the response.
#[derive(Debug)]
pub enum Error {
    /// The listening socket could not be bound.
    Bind { addr: SocketAddr, source: io::Error },
    /// Any other socket-level failure.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind { addr, source } => write!(f, "bind {addr}: {source}"),
            Self::Io(e) => write!(f, "io: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bind { source, .. } => Some(source),
            Self::Io(e) => Some(e),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
