//! The walk.
//!
//! For each request the dispatcher visits its entries in mount order and
//! invokes every one that matches:
//!
//! 1. while the request carries an error, only error handlers match;
//! 2. while it does not, only normal handlers (and nested dispatchers) match;
//! 3. a route entry must match the request method;
//! 4. the entry prefix must be a segment-aligned prefix of the path.
//!
//! After each invocation the dispatcher looks at what the handler did. `Next`
//! is consumed when called, so at most one signal arrives per invocation.
//!
//! ```text
//! sent a response ............................ stop, Finalized
//! Next::proceed() ............................ next entry
//! Next::fail(err) ............................ next entry, error state = err
//! sent twice ................................ error state = 500, error handlers only
//! nothing yet ................................ wait (bounded by the deadline)
//! ```
//!
//! A nested dispatcher is walked in place with its prefix stripped. If it
//! runs out of entries the outer walk simply continues; only the outermost
//! exhaustion becomes [`Unhandled`].

use std::sync::Arc;

use http::StatusCode;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::context::Context;
use crate::error::HandlerError;
use crate::handler::{continuation, BoxFuture, ErrorMiddleware, Handler, Middleware, Signal, Signals};
use crate::method::Method;
use crate::response::Response;
use crate::router::Entry;

// ── Results ───────────────────────────────────────────────────────────────────

/// A handler finalized the response.
#[derive(Debug)]
pub struct Finalized {
    response: Response,
}

impl Finalized {
    pub fn response(&self) -> &Response { &self.response }
    pub fn status(&self) -> StatusCode { self.response.status_code() }
    pub fn into_response(self) -> Response { self.response }
}

/// The walk ran out of entries without a response.
///
/// With no error this means nothing matched (a 404 at the boundary). With an
/// error it means no error handler rendered it (a 500-class response).
#[derive(Debug)]
pub struct Unhandled {
    method: Method,
    path: String,
    error: Option<HandlerError>,
}

impl Unhandled {
    pub fn method(&self) -> Method { self.method }

    /// The request path as it arrived.
    pub fn path(&self) -> &str { &self.path }

    pub fn error(&self) -> Option<&HandlerError> { self.error.as_ref() }
    pub fn into_error(self) -> Option<HandlerError> { self.error }
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

/// An immutable, cheaply cloneable entry list. Build one with
/// [`Router`](crate::Router).
#[derive(Clone)]
pub struct Dispatcher {
    entries: Arc<[Entry]>,
}

/// How a (possibly nested) walk ended.
enum Outcome {
    Finalized,
    Exhausted,
    /// A second contract violation: stop everything, leave the error as is.
    Halted,
}

/// State shared by the outer walk and every nested walk of one request.
struct Walk {
    deadline: Option<Instant>,
    timed_out: bool,
    violated: bool,
}

impl Walk {
    /// Runs `fut` under the deadline. `None` means the deadline passed first
    /// and `fut` was dropped.
    async fn settle<F: Future>(&self, fut: F) -> Option<F::Output> {
        match self.deadline {
            Some(deadline) if !self.timed_out => tokio::time::timeout_at(deadline, fut).await.ok(),
            _ => Some(fut.await),
        }
    }

    fn expired(&self) -> bool {
        !self.timed_out && self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    fn time_out(&mut self, cx: &mut Context) {
        warn!(path = cx.original_path(), "request deadline expired");
        self.timed_out = true;
        cx.discard_response();
        cx.set_error(HandlerError::timeout());
    }

    /// Records a contract violation. Returns `false` if this is the second
    /// one, in which case the walk must stop.
    fn violate(&mut self, cx: &mut Context, err: HandlerError) -> bool {
        warn!(path = cx.original_path(), error = %err, "handler contract violation");
        cx.discard_response();
        cx.set_error(err);
        !std::mem::replace(&mut self.violated, true)
    }
}

/// What happened to one invocation.
enum Step {
    Finalized,
    Continue,
    Halt,
}

impl Dispatcher {
    pub(crate) fn new(entries: Vec<Entry>) -> Self {
        Self { entries: entries.into() }
    }

    /// The mounted entries, in evaluation order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Walks `cx` through the entries.
    ///
    /// Resolves once a handler finalizes the response or the entries are
    /// exhausted. If `cx` carries a deadline and it passes first, the walk
    /// continues in error state with a `503` timeout error.
    pub async fn dispatch(&self, mut cx: Context) -> Result<Finalized, Unhandled> {
        let mut walk = Walk { deadline: cx.deadline(), timed_out: false, violated: false };

        let outcome = self.walk(&mut cx, &mut walk).await;

        match (outcome, cx.take_response()) {
            (Outcome::Finalized, Some(response)) => Ok(Finalized { response }),
            _ => Err(Unhandled {
                method: cx.method(),
                path: cx.original_path().to_owned(),
                error: cx.take_error(),
            }),
        }
    }

    fn walk<'a>(&'a self, cx: &'a mut Context, walk: &'a mut Walk) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            for (index, entry) in self.entries.iter().enumerate() {
                if walk.expired() {
                    walk.time_out(cx);
                }
                if !entry.matches(cx.method(), cx.path()) {
                    continue;
                }

                let step = match entry.handler() {
                    // Error handlers run only while an error is set, and take it.
                    Handler::Error(m) => {
                        let Some(err) = cx.take_error() else { continue };
                        trace!(index, prefix = entry.prefix(), "invoke error handler");
                        let (next, signals) = continuation();
                        let done = walk.settle(m.call(&err, cx, next)).await.is_some();
                        settle_invocation(cx, walk, done, signals, Some(err)).await
                    }
                    _ if cx.in_error() => continue,
                    Handler::Nested(inner) => {
                        trace!(index, prefix = entry.prefix(), "enter nested dispatcher");
                        let mounted = cx.enter(entry.prefix());
                        let outcome = inner.walk(cx, walk).await;
                        cx.leave(mounted);
                        match outcome {
                            Outcome::Exhausted => Step::Continue,
                            Outcome::Finalized => Step::Finalized,
                            Outcome::Halted => Step::Halt,
                        }
                    }
                    Handler::Normal(m) => {
                        trace!(index, prefix = entry.prefix(), "invoke");
                        let (next, signals) = continuation();
                        let done = walk.settle(m.call(cx, next)).await.is_some();
                        settle_invocation(cx, walk, done, signals, None).await
                    }
                };

                match step {
                    Step::Continue => {}
                    Step::Finalized => return Outcome::Finalized,
                    Step::Halt => return Outcome::Halted,
                }
            }
            Outcome::Exhausted
        })
    }
}

/// Interprets what one handler invocation did.
///
/// `done` is `false` when the deadline cut the handler's future short.
/// `held` is the error an error handler was given; it is reinstated if the
/// handler just proceeds.
async fn settle_invocation(
    cx: &mut Context,
    walk: &mut Walk,
    done: bool,
    mut signals: Signals,
    held: Option<HandlerError>,
) -> Step {
    if !done {
        walk.time_out(cx);
        return Step::Continue;
    }

    if cx.take_violation() {
        return violation(cx, walk, HandlerError::already_sent());
    }

    if cx.response_started() {
        if signals.try_recv().is_ok() {
            warn!(path = cx.original_path(), "handler sent a response and also called next; ignoring next");
        }
        debug!(path = cx.original_path(), "finalized");
        return Step::Finalized;
    }

    let Some(signal) = walk.settle(wait(signals, cx.original_path())).await else {
        walk.time_out(cx);
        return Step::Continue;
    };

    match signal {
        Signal::Proceed => {
            if let Some(err) = held {
                cx.set_error(err);
            }
        }
        Signal::Fail(err) => {
            debug!(path = cx.original_path(), status = %err.status(), error = %err, "handler failed");
            cx.set_error(err);
        }
    }
    Step::Continue
}

fn violation(cx: &mut Context, walk: &mut Walk, err: HandlerError) -> Step {
    if walk.violate(cx, err) { Step::Continue } else { Step::Halt }
}

/// Waits for the continuation signal. If the `Next` was dropped without
/// one, the request can only end through its deadline.
async fn wait(signals: Signals, path: &str) -> Signal {
    match signals.await {
        Ok(signal) => signal,
        Err(_) => {
            warn!(path, "handler neither responded nor called next; request is stalled");
            std::future::pending().await
        }
    }
}
