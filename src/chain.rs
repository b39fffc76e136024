//! Middleware and the chain that composes it.
//!
//! ```text
//! Chain::new([a, b]).then(app)   ==   a(b(app))
//!
//!   request  ──► a ──► b ──► app
//!   unwind   ◄── a ◄── b ◄──┘
//! ```
//!
//! The first middleware added is the outermost; the last sits right in front
//! of the terminal handler. Code a middleware runs after awaiting its inner
//! handler therefore executes in reverse declaration order.
//!
//! Only the two shapes of [`Middleware`] can be added. Anything else is
//! rejected by the compiler, not at request time:
//!
//! ```rust,compile_fail
//! use strata::Chain;
//!
//! fn not_middleware(_: u32) -> u32 { 0 }
//! let chain = Chain::new([not_middleware]);
//! ```

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::context::Context;
use crate::handler::{BoxFuture, BoxedHandler, Handler, IntoHandler, PlainHandler, handler_fn};
use crate::request::Request;
use crate::response::ResponseWriter;

// ── Middleware ────────────────────────────────────────────────────────────────

type Layer = dyn Fn(BoxedHandler) -> BoxedHandler + Send + Sync;

/// One interceptor in a [`Chain`].
///
/// A closed set of exactly two capabilities. Build values with the
/// constructors below rather than the variants directly.
#[derive(Clone)]
pub enum Middleware {
    /// Wraps the next handler and may substitute the context or the response
    /// sink it passes on.
    Contextual(Arc<Layer>),
    /// Runs before the next handler, which is then always called with the
    /// original context.
    Plain(Arc<dyn PlainHandler>),
}

impl Middleware {
    /// A middleware from a function that turns the next handler into a new
    /// one. Called once per [`Chain::then`], not per request.
    pub fn contextual<F>(layer: F) -> Self
    where
        F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
    {
        Self::Contextual(Arc::new(layer))
    }

    /// A context-aware middleware from a per-request closure receiving the
    /// next handler by reference:
    ///
    /// ```rust
    /// use strata::{Middleware, ResponseWriter};
    ///
    /// let stamp = Middleware::from_fn(|ctx, resp, req, next| Box::pin(async move {
    ///     resp.headers_mut().insert("x-served-by", "strata".parse().unwrap());
    ///     next.serve(ctx, resp, req).await;
    /// }));
    /// ```
    pub fn from_fn<F>(f: F) -> Self
    where
        F: for<'a> Fn(
                Context,
                &'a mut dyn ResponseWriter,
                &'a Request,
                &'a BoxedHandler,
            ) -> BoxFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        let f = Arc::new(f);
        Self::contextual(move |next: BoxedHandler| -> BoxedHandler {
            Arc::new(FnStage { f: Arc::clone(&f), next })
        })
    }

    /// A context-oblivious middleware. It runs first; the next stage always
    /// runs after it, with the context this stage received.
    pub fn plain(handler: impl PlainHandler) -> Self {
        Self::Plain(Arc::new(handler))
    }

    /// Forwards unchanged.
    pub fn identity() -> Self {
        Self::contextual(|next| next)
    }

    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        match self {
            Self::Contextual(layer) => layer(next),
            Self::Plain(before) => {
                let stage: BoxedHandler = Arc::new(PlainStage { before: Arc::clone(before), next });
                stage
            }
        }
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contextual(_) => f.write_str("Middleware::Contextual"),
            Self::Plain(_) => f.write_str("Middleware::Plain"),
        }
    }
}

struct FnStage<F> {
    f: Arc<F>,
    next: BoxedHandler,
}

impl<F> Handler for FnStage<F>
where
    F: for<'a> Fn(
            Context,
            &'a mut dyn ResponseWriter,
            &'a Request,
            &'a BoxedHandler,
        ) -> BoxFuture<'a>
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
        (self.f)(ctx, resp, req, &self.next)
    }
}

/// A plain middleware lifted into the context-aware shape.
struct PlainStage {
    before: Arc<dyn PlainHandler>,
    next: BoxedHandler,
}

impl Handler for PlainStage {
    fn serve<'a>(
        &'a self,
        ctx: Context,
        resp: &'a mut dyn ResponseWriter,
        req: &'a Request,
    ) -> BoxFuture<'a> {
        Box::pin(async move {
            self.before.serve(resp, req).await;
            self.next.serve(ctx, resp, req).await;
        })
    }
}

// ── Chain ─────────────────────────────────────────────────────────────────────

/// An ordered list of [`Middleware`], composed into one handler by
/// [`then`](Chain::then).
///
/// Build it once at startup. Composed handlers are `Send + Sync` and shared
/// by every request.
#[derive(Clone, Debug, Default)]
pub struct Chain {
    middleware: Vec<Middleware>,
}

impl Chain {
    /// A chain holding its own copy of `middleware`, in order.
    pub fn new(middleware: impl IntoIterator<Item = Middleware>) -> Self {
        Self { middleware: middleware.into_iter().collect() }
    }

    /// Appends one middleware in place. Returns `self` for chaining.
    pub fn add(&mut self, middleware: Middleware) -> &mut Self {
        self.middleware.push(middleware);
        self
    }

    /// Appends several middleware in place, in order.
    pub fn add_all(&mut self, middleware: impl IntoIterator<Item = Middleware>) -> &mut Self {
        self.middleware.extend(middleware);
        self
    }

    /// A new chain: this chain's middleware followed by `middleware`.
    /// `self` is left untouched.
    pub fn extend(&self, middleware: impl IntoIterator<Item = Middleware>) -> Chain {
        let mut child = self.clone();
        child.middleware.extend(middleware);
        child
    }

    /// Composes the chain around `handler`.
    ///
    /// An empty chain returns `handler` itself.
    pub fn then(&self, handler: impl IntoHandler) -> BoxedHandler {
        debug!(stages = self.middleware.len(), "composing middleware chain");
        self.middleware
            .iter()
            .rev()
            .fold(handler.into_boxed_handler(), |next, middleware| middleware.wrap(next))
    }

    /// [`then`](Chain::then) for a closure handler.
    pub fn then_fn<F>(&self, f: F) -> BoxedHandler
    where
        F: for<'a> Fn(Context, &'a mut dyn ResponseWriter, &'a Request) -> BoxFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        self.then(handler_fn(f))
    }

    pub fn len(&self) -> usize { self.middleware.len() }
    pub fn is_empty(&self) -> bool { self.middleware.is_empty() }
}

impl FromIterator<Middleware> for Chain {
    fn from_iter<I: IntoIterator<Item = Middleware>>(iter: I) -> Self {
        Self::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;
    use crate::handler::plain_fn;
    use crate::response::ResponseRecorder;

    fn marker(token: &'static str) -> Middleware {
        Middleware::from_fn(move |ctx, resp, req, next| Box::pin(async move {
            let _ = resp.write(format!("{token}|").as_bytes());
            next.serve(ctx, resp, req).await;
        }))
    }

    fn around(token: &'static str) -> Middleware {
        Middleware::from_fn(move |ctx, resp, req, next| Box::pin(async move {
            let _ = resp.write(format!(">{token} ").as_bytes());
            next.serve(ctx, resp, req).await;
            let _ = resp.write(format!("<{token} ").as_bytes());
        }))
    }

    fn app() -> BoxedHandler {
        handler_fn(|_ctx, resp, _req| Box::pin(async move {
            let _ = resp.write(b"app");
        }))
        .into_boxed_handler()
    }

    async fn run(handler: &BoxedHandler) -> String {
        let req = Request::new(http::Request::get("/").body(bytes::Bytes::new()).unwrap());
        let mut rec = ResponseRecorder::new();
        handler.serve(Context::background(), &mut rec, &req).await;
        rec.body_string()
    }

    #[tokio::test]
    async fn new_chain_wraps_handler() {
        let chain = Chain::new([marker("one")]);
        assert_eq!(run(&chain.then(app())).await, "one|app");
    }

    #[tokio::test]
    async fn add_appends_in_declared_order() {
        let mut chain = Chain::new([marker("one")]);
        chain.add(marker("two"));
        assert_eq!(run(&chain.then(app())).await, "one|two|app");

        chain.add_all([marker("three"), marker("four")]);
        assert_eq!(run(&chain.then(app())).await, "one|two|three|four|app");
    }

    #[tokio::test]
    async fn post_phase_unwinds_in_reverse() {
        let chain = Chain::new([around("a"), around("b")]);
        assert_eq!(run(&chain.then(app())).await, ">a >b app<b <a ");
    }

    #[tokio::test]
    async fn extend_leaves_parent_untouched() {
        let parent = Chain::new([marker("one"), marker("two")]);
        let before = run(&parent.then(app())).await;

        let child = parent.extend([marker("three"), marker("four")]);

        assert_eq!(run(&parent.then(app())).await, before);
        assert_eq!(before, "one|two|app");
        assert_eq!(run(&child.then(app())).await, "one|two|three|four|app");
        assert_eq!(parent.len(), 2);
        assert_eq!(child.len(), 4);
    }

    #[tokio::test]
    async fn plain_and_contextual_mix_in_order() {
        let plain = Middleware::plain(plain_fn(|resp, _req| Box::pin(async move {
            let _ = resp.write(b"plain|");
        })));
        let chain = Chain::new([marker("one"), plain, marker("three")]);
        assert_eq!(run(&chain.then(app())).await, "one|plain|three|app");
    }

    #[tokio::test]
    async fn plain_middleware_forwards_original_context() {
        struct Tag(&'static str);

        let tagger = Middleware::from_fn(|ctx, resp, req, next| Box::pin(async move {
            next.serve(ctx.with_value(Tag("outer")), resp, req).await;
        }));
        let plain = Middleware::plain(plain_fn(|_resp, _req| Box::pin(async {})));
        let handler = Chain::new([tagger, plain]).then_fn(|ctx, resp, _req| Box::pin(async move {
            let tag = ctx.value::<Tag>().map_or("none", |t| t.0);
            let _ = resp.write(tag.as_bytes());
        }));

        assert_eq!(run(&handler).await, "outer");
    }

    #[tokio::test]
    async fn plain_middleware_cannot_short_circuit() {
        let deny = Middleware::plain(plain_fn(|resp, _req| Box::pin(async move {
            resp.write_status(StatusCode::FORBIDDEN);
        })));
        let handler = Chain::new([deny]).then(app());

        let req = Request::new(http::Request::get("/").body(bytes::Bytes::new()).unwrap());
        let mut rec = ResponseRecorder::new();
        handler.serve(Context::background(), &mut rec, &req).await;

        assert_eq!(rec.status(), StatusCode::FORBIDDEN);
        assert_eq!(rec.body(), b"app");
    }

    #[tokio::test]
    async fn empty_chain_returns_handler_unchanged() {
        let handler = app();
        let composed = Chain::default().then(Arc::clone(&handler));
        assert!(Arc::ptr_eq(&handler, &composed));
    }

    #[tokio::test]
    async fn identity_forwards_unchanged() {
        let chain = Chain::new([Middleware::identity(), marker("one"), Middleware::identity()]);
        assert_eq!(run(&chain.then(app())).await, "one|app");
    }

    #[test]
    fn collects_from_iterator() {
        let chain: Chain = [marker("a"), marker("b")].into_iter().collect();
        assert_eq!(chain.len(), 2);
        assert!(!chain.is_empty());
    }
}
