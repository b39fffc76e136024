//! Handler traits and type erasure.
//!
//! # Two capabilities
//!
//! A pipeline stage is either *context-aware*, receiving the request's
//! [`Context`] and able to observe cancellation, or *context-oblivious*, seeing
//! only the response sink and the request:
//!
//! ```text
//! Handler       serve(ctx, resp, req)   ← stages, terminal handlers
//! PlainHandler  serve(resp, req)        ← header stampers, simple filters
//! ```
//!
//! Everything the chain stores and composes is a [`BoxedHandler`]
//! (`Arc<dyn Handler>`); plain handlers are adapted into that shape by the
//! chain itself, see [`Middleware::plain`](crate::Middleware::plain).
//!
//! # Why the futures are boxed
//!
//! `serve` borrows the response sink and the request for as long as the
//! returned future lives. Trait objects cannot have `async fn` methods, so
//! each call returns a [`BoxFuture`] tied to those borrows. The per-stage cost
//! is one allocation and one virtual call.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::request::Request;
use crate::response::ResponseWriter;

/// A heap-allocated, type-erased future borrowing the stage's arguments.
pub type BoxFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// A context-aware request handler.
///
/// Failures are reported by writing an error status and body to `resp`;
/// there is no error return.
pub trait Handler: Send + Sync + 'static {
    fn serve<'a>(
        &'a self,
        ctx: Context,
        resp: &'a mut dyn ResponseWriter,
        req: &'a Request,
    ) -> BoxFuture<'a>;
}

/// A context-oblivious request handler.
pub trait PlainHandler: Send + Sync + 'static {
    fn serve<'a>(&'a self, resp: &'a mut dyn ResponseWriter, req: &'a Request) -> BoxFuture<'a>;
}

/// A type-erased handler shared across concurrent requests.
pub type BoxedHandler = Arc<dyn Handler>;

/// Conversion into a [`BoxedHandler`].
///
/// Implemented for every [`Handler`] and for `BoxedHandler` itself, so an
/// already-composed pipeline is reused as-is rather than wrapped again.
pub trait IntoHandler {
    fn into_boxed_handler(self) -> BoxedHandler;
}

impl<H: Handler> IntoHandler for H {
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(self)
    }
}

impl IntoHandler for BoxedHandler {
    fn into_boxed_handler(self) -> BoxedHandler {
        self
    }
}

// ── Closure adapters ──────────────────────────────────────────────────────────

/// Builds a [`Handler`] from a closure.
///
/// The closure returns a boxed future so it can borrow `resp` and `req`:
///
/// ```rust
/// use strata::{handler_fn, ResponseWriter};
///
/// let hello = handler_fn(|_ctx, resp, req| Box::pin(async move {
///     let _ = resp.write(format!("hello from {}", req.request_uri()).as_bytes());
/// }));
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(Context, &'a mut dyn ResponseWriter, &'a Request) -> BoxFuture<'a>
        + Send
        + Sync
        + 'static,
{
    HandlerFn(f)
}

/// Builds a [`PlainHandler`] from a closure. See [`handler_fn`].
pub fn plain_fn<F>(f: F) -> PlainFn<F>
where
    F: for<'a> Fn(&'a mut dyn ResponseWriter, &'a Request) -> BoxFuture<'a>
        + Send
        + Sync
        + 'static,
{
    PlainFn(f)
}

/// Returned by [`handler_fn`].
pub struct HandlerFn<F>(F);

impl<F> Handler for HandlerFn<F>
where
    F: for<'a> Fn(Context, &'a mut dyn ResponseWriter, &'a Request) -> BoxFuture<'a>
        + Send
        + Sync
        + 'static,
{
    fn serve<'a>(
        &'a self,
        ctx: Context,
        resp: &'a mut dyn ResponseWriter,
        req: &'a Request,
    ) -> BoxFuture<'a> {
        (self.0)(ctx, resp, req)
    }
}

/// Returned by [`plain_fn`].
pub struct PlainFn<F>(F);

impl<F> PlainHandler for PlainFn<F>
where
    F: for<'a> Fn(&'a mut dyn ResponseWriter, &'a Request) -> BoxFuture<'a>
        + Send
        + Sync
        + 'static,
{
    fn serve<'a>(&'a self, resp: &'a mut dyn ResponseWriter, req: &'a Request) -> BoxFuture<'a> {
        (self.0)(resp, req)
    }
}
