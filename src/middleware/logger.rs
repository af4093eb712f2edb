//! Request logging.

use tokio::time::Instant;
use tracing::info;

use crate::context::Context;
use crate::handler::{BoxFuture, Middleware, Next};

/// Attribute holding the [`Instant`] the logger saw the request.
pub const STARTED_AT: &str = "started_at";

/// Logs `method` and `path` at `info` and stamps [`STARTED_AT`].
#[derive(Clone, Copy, Debug, Default)]
pub struct Logger;

pub fn logger() -> Logger {
    Logger
}

impl Middleware for Logger {
    fn call<'a>(&'a self, cx: &'a mut Context, next: Next) -> BoxFuture<'a> {
        info!(method = %cx.method(), path = cx.original_path(), "request");
        cx.set(STARTED_AT, Instant::now());
        next.proceed();
        Box::pin(async {})
    }
}
