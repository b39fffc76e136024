//! Request-scoped cancellation, deadlines and values.
//!
//! A [`Context`] travels with a request through every pipeline stage. Stages
//! derive children from it (with a deadline, with a value) and
//! hand the child downstream. Cancellation flows parent → child, never the
//! other way.
//!
//! # Cancellation is advisory
//!
//! Nothing here interrupts running code. A deadline passing only changes what
//! [`Context::done`] and [`Context::err`] report. A handler that never looks
//! at its context runs to completion regardless:
//!
//! ```rust
//! # use std::time::Duration;
//! # use strata::{Context, ContextError};
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (ctx, _guard) = Context::background().with_timeout(Duration::from_millis(10));
//!
//! tokio::select! {
//!     () = ctx.done() => assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded)),
//!     () = tokio::time::sleep(Duration::from_secs(5)) => unreachable!(),
//! }
//! # }
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

// ── ContextError ──────────────────────────────────────────────────────────────

/// Why a context is done.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContextError {
    /// Cancelled explicitly, or because an ancestor was.
    Canceled,
    /// The deadline passed before the context was cancelled.
    DeadlineExceeded,
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Canceled => f.write_str("context canceled"),
            Self::DeadlineExceeded => f.write_str("context deadline exceeded"),
        }
    }
}

impl std::error::Error for ContextError {}

// ── Context ───────────────────────────────────────────────────────────────────

/// Cancellation signal, optional deadline and typed values for one request.
///
/// Cloning is one `Arc` increment. Clones observe the same signal.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    parent: Option<Context>,
    token: CancellationToken,
    deadline: Option<Instant>,
    // First recorded cause and when it took effect. Set once on cancel.
    cause: OnceLock<(ContextError, Instant)>,
    value: Option<(TypeId, Arc<dyn Any + Send + Sync>)>,
}

impl Context {
    /// The root context: never cancelled, no deadline, no values.
    pub fn background() -> Self {
        Self::from_inner(Inner {
            parent: None,
            token: CancellationToken::new(),
            deadline: None,
            cause: OnceLock::new(),
            value: None,
        })
    }

    /// A child that is cancelled when the returned guard is cancelled or
    /// dropped, or when `self` is.
    pub fn with_cancel(&self) -> (Context, CancelGuard) {
        self.child(self.inner.deadline)
    }

    /// Like [`with_cancel`](Self::with_cancel), and additionally done at
    /// `deadline`. An inherited earlier deadline is kept.
    pub fn with_deadline(&self, deadline: Instant) -> (Context, CancelGuard) {
        let deadline = match self.inner.deadline {
            Some(inherited) if inherited < deadline => inherited,
            _ => deadline,
        };
        self.child(Some(deadline))
    }

    /// Shorthand for `with_deadline(Instant::now() + timeout)`.
    ///
    /// A timeout too large to represent as an instant (`Duration::MAX`) adds
    /// no deadline of its own.
    pub fn with_timeout(&self, timeout: Duration) -> (Context, CancelGuard) {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.with_cancel(),
        }
    }

    /// A child carrying `value`, looked up by type with [`value`](Self::value).
    ///
    /// The child shares its parent's cancellation and deadline.
    pub fn with_value<T: Send + Sync + 'static>(&self, value: T) -> Context {
        Self::from_inner(Inner {
            parent: Some(self.clone()),
            token: self.inner.token.clone(),
            deadline: self.inner.deadline,
            cause: OnceLock::new(),
            value: Some((TypeId::of::<T>(), Arc::new(value))),
        })
    }

    /// The nearest value of type `T` set on this context or an ancestor.
    pub fn value<T: Send + Sync + 'static>(&self) -> Option<&T> {
        let mut ctx = self;
        loop {
            if let Some((id, value)) = &ctx.inner.value {
                if *id == TypeId::of::<T>() {
                    return value.downcast_ref::<T>();
                }
            }
            ctx = ctx.inner.parent.as_ref()?;
        }
    }

    /// The instant at which this context is done, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Resolves once the context is cancelled or its deadline passes.
    ///
    /// Combine with other events in `tokio::select!` to stop work early.
    pub async fn done(&self) {
        match self.inner.deadline {
            Some(deadline) => tokio::select! {
                () = self.inner.token.cancelled() => {}
                () = tokio::time::sleep_until(deadline) => {}
            },
            None => self.inner.token.cancelled().await,
        }
    }

    /// Non-blocking check: `true` once [`err`](Self::err) is `Some`.
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// `None` while the context is live, otherwise why it is done.
    ///
    /// The first cause sticks: a context cancelled before its deadline
    /// reports `Canceled` forever after, and one whose deadline passed before
    /// an ancestor was cancelled keeps reporting `DeadlineExceeded`.
    pub fn err(&self) -> Option<ContextError> {
        self.done_at().map(|(cause, _)| cause)
    }

    /// Why and since when this context is done, whichever happened first of
    /// its own cancellation, an ancestor's, or its deadline.
    fn done_at(&self) -> Option<(ContextError, Instant)> {
        if let Some(done) = self.inner.cause.get() {
            return Some(*done);
        }
        let inherited = self.inner.parent.as_ref().and_then(Context::done_at);
        let expired = self
            .inner
            .deadline
            .filter(|deadline| Instant::now() >= *deadline)
            .map(|deadline| (ContextError::DeadlineExceeded, deadline));
        match (inherited, expired) {
            (Some(parent), Some(own)) if own.1 <= parent.1 => Some(own),
            (Some(parent), _) => Some(parent),
            (None, own) => own,
        }
    }

    fn child(&self, deadline: Option<Instant>) -> (Context, CancelGuard) {
        let ctx = Self::from_inner(Inner {
            parent: Some(self.clone()),
            token: self.inner.token.child_token(),
            deadline,
            cause: OnceLock::new(),
            value: None,
        });
        let guard = CancelGuard { ctx: Some(ctx.clone()) };
        (ctx, guard)
    }

    fn cancel(&self) {
        let done = self.done_at().unwrap_or((ContextError::Canceled, Instant::now()));
        let _ = self.inner.cause.set(done);
        self.inner.token.cancel();
    }

    fn from_inner(inner: Inner) -> Self {
        Self { inner: Arc::new(inner) }
    }
}

impl Default for Context {
    fn default() -> Self { Self::background() }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("deadline", &self.inner.deadline)
            .field("err", &self.err())
            .finish_non_exhaustive()
    }
}

// ── CancelGuard ───────────────────────────────────────────────────────────────

/// Cancels its context when [`cancel`](Self::cancel) is called or when
/// dropped, releasing whatever waits on [`Context::done`].
#[must_use = "dropping the guard cancels the context immediately"]
pub struct CancelGuard {
    ctx: Option<Context>,
}

impl CancelGuard {
    pub fn cancel(mut self) {
        if let Some(ctx) = self.ctx.take() {
            ctx.cancel();
        }
    }

    /// Keep the context alive past the guard; it is then only cancelled
    /// through its parent or its deadline.
    pub fn disarm(mut self) {
        self.ctx = None;
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            ctx.cancel();
        }
    }
}
