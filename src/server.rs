//! hyper adapter and graceful shutdown.
//!
//! [`Server`] is the thinnest transport that can drive a composed pipeline:
//! it buffers each request body, runs the handler against a
//! [`ResponseRecorder`], and sends what was recorded. Routing, TLS and body
//! limits belong in front of it (a router handler, a reverse proxy).
//!
//! # Contexts and shutdown
//!
//! Every request gets a child of one root [`Context`]. When the shutdown
//! signal fires (**SIGTERM** or **Ctrl-C** for [`Server::serve`], any future
//! for [`Server::serve_with_shutdown`]) the server:
//!
//! 1. stops accepting connections;
//! 2. cancels the root context, so handlers selecting on
//!    [`Context::done`] can wrap up early;
//! 3. waits for every in-flight connection to finish, then returns.
//!
//! A request's own context is also cancelled when hyper drops the request
//! future, e.g. because the client went away.

use std::convert::Infallible;
use std::fmt::Display;
use std::future::Future;
use std::net::SocketAddr;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::context::Context;
use crate::error::Error;
use crate::handler::{BoxedHandler, IntoHandler};
use crate::request::Request;
use crate::response::{ResponseRecorder, ResponseWriter};

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr.parse().expect("invalid socket address");
        Self { addr }
    }

    /// Binds, then serves `handler` until SIGTERM or Ctrl-C.
    ///
    /// Returns only after a full graceful shutdown.
    pub async fn serve(self, handler: impl IntoHandler) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|source| Error::Bind { addr: self.addr, source })?;
        Self::serve_with_shutdown(listener, handler, shutdown_signal()).await
    }

    /// Serves `handler` on an already bound `listener` until `signal`
    /// resolves, then drains.
    ///
    /// ```rust,no_run
    /// # async fn run() -> Result<(), strata::Error> {
    /// use strata::{Chain, Server};
    /// use tokio::net::TcpListener;
    ///
    /// let listener = TcpListener::bind("127.0.0.1:0").await?;
    /// let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    /// let app = Chain::default().then_fn(|_ctx, _resp, _req| Box::pin(async {}));
    ///
    /// tokio::spawn(async move {
    ///     tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    ///     let _ = stop.send(());
    /// });
    /// Server::serve_with_shutdown(listener, app, async { let _ = stopped.await; }).await
    /// # }
    /// ```
    pub async fn serve_with_shutdown(
        listener: TcpListener,
        handler: impl IntoHandler,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let handler = handler.into_boxed_handler();
        let (root, cancel_root) = Context::background().with_cancel();
        let mut connections = JoinSet::new();

        info!(addr = %listener.local_addr()?, "strata listening");

        tokio::pin!(signal);
        loop {
            tokio::select! {
                // Checked first so a signal stops accepting at once, even
                // with connections queued.
                biased;

                () = &mut signal => {
                    info!(in_flight = connections.len(), "shutting down, draining connections");
                    break;
                }

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let conn = serve_connection(stream, peer, handler.clone(), root.clone());
                        connections.spawn(conn);
                    }
                    Err(e) => error!("accept error: {e}"),
                },

                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        cancel_root.cancel();
        while connections.join_next().await.is_some() {}

        info!("strata stopped");
        Ok(())
    }
}

/// Drives one HTTP/1 or HTTP/2 connection until the peer closes it.
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    handler: BoxedHandler,
    root: Context,
) {
    let svc = service_fn(move |req: hyper::Request<hyper::body::Incoming>| {
        dispatch(handler.clone(), root.clone(), req, peer)
    });

    if let Err(e) = ConnBuilder::new(TokioExecutor::new())
        .serve_connection(TokioIo::new(stream), svc)
        .await
    {
        error!(%peer, "connection error: {e}");
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Buffers one request, runs the pipeline, converts what it wrote.
///
/// A body that fails to arrive completely is answered with `400` without
/// reaching the pipeline.
async fn dispatch<B>(
    handler: BoxedHandler,
    root: Context,
    req: hyper::Request<B>,
    peer: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: Display,
{
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(%peer, "failed to read request body: {e}");
            let mut recorder = ResponseRecorder::new();
            recorder.write_status(StatusCode::BAD_REQUEST);
            return Ok(recorder.into_response());
        }
    };
    let request = Request::from_parts(parts, body).with_remote_addr(peer.to_string());

    // Dropped with this future, cancelling the request's context.
    let (ctx, _cancel) = root.with_cancel();
    let mut recorder = ResponseRecorder::new();
    handler.serve(ctx, &mut recorder, &request).await;

    Ok(recorder.into_response())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM (Unix) or Ctrl-C the process receives.
///
/// A signal whose handler cannot be installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = sigterm => {}
    }
}
