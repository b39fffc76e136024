//! # strata
//!
//! Request middleware for Rust services: an ordered chain of interceptors
//! composed into one handler, cooperative deadlines, and a low-allocation
//! access log.
//!
//! ## The model
//!
//! A handler receives a [`Context`], a response sink and the request. It
//! writes a status and body bytes into the sink; it returns nothing.
//! Middleware wraps a handler into another handler. A [`Chain`] is an ordered
//! list of middleware, composed around a terminal handler with
//! [`Chain::then`].
//!
//! What the chain deliberately leaves to its neighbours:
//!
//! - **Routing**: dispatch to the right composed handler happens in front
//! - **Rate limiting, CORS, credential checks**: just more middleware
//! - **TLS and the socket**: the transport, e.g. the bundled [`Server`]
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use http::StatusCode;
//! use strata::middleware::{error_logger, timeout, TracingSink};
//! use strata::{Chain, ResponseWriter, Server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let common = Chain::new([
//!         error_logger(TracingSink),
//!         timeout(Duration::from_secs(30)),
//!     ]);
//!
//!     let app = common.then_fn(|ctx, resp, req| Box::pin(async move {
//!         if req.body().is_empty() {
//!             resp.write_status(StatusCode::BAD_REQUEST);
//!             let _ = resp.write(b"empty body\n");
//!             return;
//!         }
//!         tokio::select! {
//!             () = ctx.done() => resp.write_status(StatusCode::GATEWAY_TIMEOUT),
//!             () = tokio::time::sleep(Duration::from_millis(5)) => {
//!                 resp.write_status(StatusCode::CREATED);
//!             }
//!         }
//!     }));
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! }
//! ```

mod chain;
mod context;
mod error;
mod handler;
mod request;
mod response;
mod server;

pub mod middleware;

pub use chain::{Chain, Middleware};
pub use context::{CancelGuard, Context, ContextError};
pub use error::Error;
pub use handler::{
    BoxFuture, BoxedHandler, Handler, HandlerFn, IntoHandler, PlainFn, PlainHandler, handler_fn,
    plain_fn,
};
pub use request::Request;
pub use response::{ResponseRecorder, ResponseWriter};
pub use server::Server;
