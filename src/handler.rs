//! Handler traits, the continuation token, and type erasure.
//!
//! # Two kinds of handler, chosen at mount time
//!
//! A handler's role is fixed by the trait it is mounted through, never
//! inferred from its shape:
//!
//! ```text
//! Middleware       fn(&mut Context, Next)                 ← runs while the request is healthy
//! ErrorMiddleware  fn(&HandlerError, &mut Context, Next)  ← runs only once an error is set
//! ```
//!
//! Both are stored behind `Arc<dyn …>` inside a [`Handler`] so one entry list
//! can hold handlers of every concrete type.
//!
//! # The contract
//!
//! Every invocation must do exactly one of:
//!
//! 1. finalize — [`Context::send`](crate::Context::send);
//! 2. continue — [`Next::proceed`];
//! 3. divert — [`Next::fail`], which continues with error handlers only.
//!
//! `Next` is `Send + 'static`: it can be moved into a spawned task and
//! called once some background work completes. The dispatcher waits for it.
//! Calling it consumes it, so a second call does not compile.
//!
//! # Writing handlers
//!
//! Plain `fn` items work directly:
//!
//! ```rust
//! use passage::{BoxFuture, Context, Next};
//! use http::StatusCode;
//!
//! fn require_token(cx: &mut Context, next: Next) -> BoxFuture<'_> {
//!     Box::pin(async move {
//!         match cx.header("authorization") {
//!             Some(_) => next.proceed(),
//!             None => cx.send(StatusCode::FORBIDDEN),
//!         }
//!     })
//! }
//! ```
//!
//! Closures go through [`from_fn`] / [`error_fn`] so their signature can be
//! inferred.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::warn;

use crate::context::Context;
use crate::dispatcher::Dispatcher;
use crate::error::HandlerError;

/// A heap-allocated, type-erased future borrowed from the invocation's
/// arguments.
pub type BoxFuture<'a, T = ()> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ── Traits ────────────────────────────────────────────────────────────────────

/// A normal handler: middleware or route.
pub trait Middleware: Send + Sync + 'static {
    fn call<'a>(&'a self, cx: &'a mut Context, next: Next) -> BoxFuture<'a>;
}

impl<F> Middleware for F
where
    F: for<'a> Fn(&'a mut Context, Next) -> BoxFuture<'a> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, cx: &'a mut Context, next: Next) -> BoxFuture<'a> {
        (self)(cx, next)
    }
}

/// An error handler. Only invoked while the request carries an error.
///
/// Calling [`Next::proceed`] hands the same error on to the next error
/// handler; [`Next::fail`] replaces it.
pub trait ErrorMiddleware: Send + Sync + 'static {
    fn call<'a>(&'a self, err: &'a HandlerError, cx: &'a mut Context, next: Next) -> BoxFuture<'a>;
}

impl<F> ErrorMiddleware for F
where
    F: for<'a> Fn(&'a HandlerError, &'a mut Context, Next) -> BoxFuture<'a> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, err: &'a HandlerError, cx: &'a mut Context, next: Next) -> BoxFuture<'a> {
        (self)(err, cx, next)
    }
}

/// Pins a closure to the [`Middleware`] signature.
///
/// ```rust
/// use passage::{Router, handler::from_fn};
///
/// let app = Router::new().middleware("/", from_fn(|cx, next| Box::pin(async move {
///     cx.set("seen", true);
///     next.proceed();
/// })));
/// ```
pub fn from_fn<F>(f: F) -> F
where
    F: for<'a> Fn(&'a mut Context, Next) -> BoxFuture<'a> + Send + Sync + 'static,
{
    f
}

/// Pins a closure to the [`ErrorMiddleware`] signature.
pub fn error_fn<F>(f: F) -> F
where
    F: for<'a> Fn(&'a HandlerError, &'a mut Context, Next) -> BoxFuture<'a> + Send + Sync + 'static,
{
    f
}

// ── Handler ───────────────────────────────────────────────────────────────────

/// What an entry invokes when it matches.
#[derive(Clone)]
pub enum Handler {
    Normal(Arc<dyn Middleware>),
    Error(Arc<dyn ErrorMiddleware>),
    /// A nested dispatcher walked with the entry's prefix stripped.
    Nested(Dispatcher),
}

impl Handler {
    pub fn normal(m: impl Middleware) -> Self {
        Self::Normal(Arc::new(m))
    }

    pub fn error(m: impl ErrorMiddleware) -> Self {
        Self::Error(Arc::new(m))
    }

    pub fn nested(dispatcher: impl Into<Dispatcher>) -> Self {
        Self::Nested(dispatcher.into())
    }

    pub fn is_error_handler(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

// ── Next ──────────────────────────────────────────────────────────────────────

/// What a handler told the dispatcher to do.
#[derive(Debug)]
pub(crate) enum Signal {
    Proceed,
    Fail(HandlerError),
}

/// The continuation handed to one handler invocation.
///
/// `proceed` and `fail` consume the token, so a handler can resume the walk
/// at most once, however long it holds on to it:
///
/// ```rust,compile_fail
/// use passage::{BoxFuture, Context, Next};
///
/// fn twice(_cx: &mut Context, next: Next) -> BoxFuture<'_> {
///     next.proceed();
///     next.proceed();
///     Box::pin(async {})
/// }
/// ```
#[derive(Debug)]
pub struct Next {
    tx: oneshot::Sender<Signal>,
}

pub(crate) type Signals = oneshot::Receiver<Signal>;

pub(crate) fn continuation() -> (Next, Signals) {
    let (tx, rx) = oneshot::channel();
    (Next { tx }, rx)
}

impl Next {
    /// Resume the walk at the next entry.
    pub fn proceed(self) {
        self.signal(Signal::Proceed);
    }

    /// Resume the walk in error state: only error handlers run from here on.
    pub fn fail(self, err: impl Into<HandlerError>) {
        self.signal(Signal::Fail(err.into()));
    }

    fn signal(self, signal: Signal) {
        if self.tx.send(signal).is_err() {
            warn!("continuation called after the walk moved on; ignoring");
        }
    }
}
