//! Cooperative request deadlines.
//!
//! [`timeout`] gives everything downstream a [`Context`] that is done after a
//! fixed duration. It does **not** stop the inner handler: the stage awaits it
//! to completion whatever the clock says. Handlers that want to give up early
//! select on [`Context::done`]:
//!
//! ```rust
//! use std::time::Duration;
//! use http::StatusCode;
//! use strata::{Chain, ResponseWriter, middleware::timeout};
//!
//! let handler = Chain::new([timeout(Duration::from_secs(2))]).then_fn(|ctx, resp, _req| {
//!     Box::pin(async move {
//!         tokio::select! {
//!             () = ctx.done() => resp.write_status(StatusCode::GATEWAY_TIMEOUT),
//!             () = tokio::time::sleep(Duration::from_millis(10)) => {
//!                 let _ = resp.write(b"done");
//!             }
//!         }
//!     })
//! });
//! ```
//!
//! Forcibly dropping the inner future is deliberately not offered: a handler
//! cut off mid-write would leave the response in a state no later stage could
//! reason about.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::context::{Context, ContextError};
use crate::handler::{BoxFuture, BoxedHandler, Handler, IntoHandler};
use crate::request::Request;
use crate::response::ResponseWriter;
use crate::Middleware;

/// Downstream stages see a context that is done `duration` from now.
pub fn timeout(duration: Duration) -> Middleware {
    Middleware::contextual(move |next| -> BoxedHandler {
        Arc::new(Timeout { duration, next, fallback: None })
    })
}

/// Like [`timeout`], and once the inner handler returns, runs `fallback` if
/// the deadline had passed by then.
///
/// The fallback gets the expired context and the same response sink. If the
/// inner handler already wrote a status or body, the fallback's writes land
/// after it: the status stays whatever was committed first and body bytes
/// are appended. Handlers that honour cancellation by returning without
/// writing avoid this.
pub fn on_timeout(duration: Duration, fallback: impl IntoHandler) -> Middleware {
    let fallback = fallback.into_boxed_handler();
    Middleware::contextual(move |next| -> BoxedHandler {
        Arc::new(Timeout { duration, next, fallback: Some(Arc::clone(&fallback)) })
    })
}

struct Timeout {
    duration: Duration,
    next: BoxedHandler,
    fallback: Option<BoxedHandler>,
}

impl Handler for Timeout {
    fn serve<'a>(
        &'a self,
        ctx: Context,
        resp: &'a mut dyn ResponseWriter,
        req: &'a Request,
    ) -> BoxFuture<'a> {
        Box::pin(async move {
            let (ctx, guard) = ctx.with_timeout(self.duration);
            self.next.serve(ctx.clone(), resp, req).await;
            guard.cancel();

            let Some(fallback) = &self.fallback else { return };
            if ctx.err() == Some(ContextError::DeadlineExceeded) {
                debug!(
                    timeout = ?self.duration,
                    path = req.uri().path(),
                    "deadline exceeded, running fallback"
                );
                fallback.serve(ctx, resp, req).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::StatusCode;
    use tokio::time::Instant;

    use super::*;
    use crate::handler::handler_fn;
    use crate::response::ResponseRecorder;
    use crate::Chain;

    /// Waits on the context, or gives up on it after `work`.
    fn racing_app(work: Duration) -> BoxedHandler {
        handler_fn(move |ctx, resp, _req| Box::pin(async move {
            tokio::select! {
                () = ctx.done() => { let _ = resp.write(b"timeout"); }
                () = tokio::time::sleep(work) => { let _ = resp.write(b"no timeout"); }
            }
        }))
        .into_boxed_handler()
    }

    fn fallback() -> BoxedHandler {
        handler_fn(|_ctx, resp, _req| Box::pin(async move {
            resp.write_status(StatusCode::GATEWAY_TIMEOUT);
            let _ = resp.write(b"timeout handler");
        }))
        .into_boxed_handler()
    }

    async fn run(handler: BoxedHandler) -> ResponseRecorder {
        let req = Request::new(http::Request::get("/slow").body(Bytes::new()).unwrap());
        let mut rec = ResponseRecorder::new();
        handler.serve(Context::background(), &mut rec, &req).await;
        rec
    }

    #[tokio::test(start_paused = true)]
    async fn done_fires_at_the_deadline() {
        let started = Instant::now();
        let handler = Chain::new([timeout(Duration::from_millis(100))])
            .then(racing_app(Duration::from_secs(1)));

        let rec = run(handler).await;

        assert_eq!(rec.body_string(), "timeout");
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(100), "fired early: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(150), "fired late: {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn fast_handler_sees_no_cancellation() {
        let handler = Chain::new([timeout(Duration::from_secs(1))])
            .then(racing_app(Duration::from_millis(100)));
        assert_eq!(run(handler).await.body_string(), "no timeout");
    }

    #[tokio::test(start_paused = true)]
    async fn handler_sees_deadline_and_reason() {
        let handler = Chain::new([timeout(Duration::from_millis(250))]).then_fn(|ctx, resp, _req| {
            Box::pin(async move {
                assert!(ctx.deadline().is_some());
                ctx.done().await;
                let _ = resp.write(ctx.err().map(|e| e.to_string()).unwrap_or_default().as_bytes());
            })
        });
        assert_eq!(run(handler).await.body_string(), "context deadline exceeded");
    }

    #[tokio::test(start_paused = true)]
    async fn uncooperative_handler_runs_to_completion() {
        let handler = Chain::new([timeout(Duration::from_millis(10))]).then_fn(|_ctx, resp, _req| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                let _ = resp.write(b"finished anyway");
            })
        });
        assert_eq!(run(handler).await.body_string(), "finished anyway");
    }

    #[tokio::test(start_paused = true)]
    async fn on_timeout_runs_fallback_after_deadline() {
        let silent = handler_fn(|ctx, _resp, _req| Box::pin(async move { ctx.done().await }));
        let handler = Chain::new([on_timeout(Duration::from_millis(100), fallback())]).then(silent);

        let rec = run(handler).await;
        assert_eq!(rec.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(rec.body_string(), "timeout handler");
    }

    #[tokio::test(start_paused = true)]
    async fn on_timeout_skips_fallback_within_deadline() {
        let handler = Chain::new([on_timeout(Duration::from_secs(1), fallback())])
            .then(racing_app(Duration::from_millis(100)));

        let rec = run(handler).await;
        assert_eq!(rec.status(), StatusCode::OK);
        assert_eq!(rec.body_string(), "no timeout");
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_appends_after_partial_write() {
        // Inner handler writes, then overruns. The fallback still runs.
        let chain = Chain::new([on_timeout(Duration::from_millis(10), fallback())]);
        let handler = chain.then_fn(|_ctx, resp, _req| {
            Box::pin(async move {
                let _ = resp.write(b"partial;");
                tokio::time::sleep(Duration::from_millis(20)).await;
            })
        });

        let rec = run(handler).await;
        assert_eq!(rec.status(), StatusCode::OK);
        assert_eq!(rec.body_string(), "partial;timeout handler");
    }

    #[tokio::test(start_paused = true)]
    async fn parent_cancellation_is_not_reported_as_timeout() {
        let (parent, guard) = Context::background().with_cancel();
        guard.cancel();

        let chain = Chain::new([on_timeout(Duration::from_secs(1), fallback())]);
        let handler = chain.then_fn(|ctx, resp, _req| {
            Box::pin(async move {
                ctx.done().await;
                let _ = resp.write(b"cancelled");
            })
        });

        let req = Request::new(http::Request::get("/").body(Bytes::new()).unwrap());
        let mut rec = ResponseRecorder::new();
        handler.serve(parent, &mut rec, &req).await;
        assert_eq!(rec.body_string(), "cancelled");
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_runs_when_cancel_follows_overrun() {
        let (parent, guard) = Context::background().with_cancel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            guard.cancel();
        });

        let chain = Chain::new([on_timeout(Duration::from_millis(10), fallback())]);
        let handler = chain.then_fn(|_ctx, _resp, _req| {
            Box::pin(async move { tokio::time::sleep(Duration::from_millis(50)).await })
        });

        let req = Request::new(http::Request::get("/").body(Bytes::new()).unwrap());
        let mut rec = ResponseRecorder::new();
        handler.serve(parent.clone(), &mut rec, &req).await;

        assert_eq!(parent.err(), Some(ContextError::Canceled));
        assert_eq!(rec.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(rec.body_string(), "timeout handler");
    }

    #[tokio::test(start_paused = true)]
    async fn max_duration_never_times_out() {
        let chain = Chain::new([on_timeout(Duration::MAX, fallback())]);
        let handler = chain.then_fn(|ctx, resp, _req| {
            Box::pin(async move {
                assert_eq!(ctx.deadline(), None);
                tokio::time::sleep(Duration::from_secs(3600)).await;
                let state: &[u8] = if ctx.is_done() { b"done" } else { b"live" };
                let _ = resp.write(state);
            })
        });

        let rec = run(handler).await;
        assert_eq!(rec.status(), StatusCode::OK);
        assert_eq!(rec.body_string(), "live");
    }
}
