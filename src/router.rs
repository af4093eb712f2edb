//! The application router: an ordered, append-only list of entries.
//!
//! Mount order is evaluation order. There is no reordering by specificity,
//! method, or prefix length. A body parser mounted after the route that
//! reads the body is a bug in the mount list, not something passage fixes
//! for you. Build the list once at startup, then freeze it with
//! [`Router::build`] (or pass the router straight to
//! [`Server::serve`](crate::Server::serve)).

use tracing::debug;

use crate::dispatcher::Dispatcher;
use crate::handler::{ErrorMiddleware, Handler, Middleware};
use crate::method::Method;

// ── Entry ─────────────────────────────────────────────────────────────────────

/// One mounted unit: a path prefix, an optional method, and a handler.
///
/// No method means "middleware": it matches every method. A method makes it
/// a route.
#[derive(Clone)]
pub struct Entry {
    prefix: String,
    method: Option<Method>,
    handler: Handler,
}

impl Entry {
    /// Creates an entry. `prefix` is normalized: `""` and `"/"` match every
    /// path, a missing leading slash is added, trailing slashes are dropped.
    pub fn new(prefix: &str, method: Option<Method>, handler: Handler) -> Self {
        Self { prefix: normalize_prefix(prefix), method, handler }
    }

    pub fn prefix(&self) -> &str { &self.prefix }
    pub fn method(&self) -> Option<Method> { self.method }
    pub fn handler(&self) -> &Handler { &self.handler }

    pub fn is_error_handler(&self) -> bool {
        self.handler.is_error_handler()
    }

    /// Method and path rules only; the error-state rule is the dispatcher's.
    pub(crate) fn matches(&self, method: Method, path: &str) -> bool {
        self.method.is_none_or(|m| m == method) && matches_prefix(&self.prefix, path)
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_owned()
    } else {
        format!("/{trimmed}")
    }
}

/// `true` when `prefix` is a segment-aligned prefix of `path`.
///
/// `/admin` matches `/admin` and `/admin/x` but not `/administrator`.
/// The empty prefix matches everything.
pub fn matches_prefix(prefix: &str, path: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => prefix.is_empty() || rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

// ── Router ────────────────────────────────────────────────────────────────────

/// Builder for a [`Dispatcher`].
///
/// ```rust
/// use passage::{BoxFuture, Context, Next, Router, middleware};
///
/// fn list_users(cx: &mut Context, _next: Next) -> BoxFuture<'_> {
///     Box::pin(async move { cx.send("[]") })
/// }
///
/// let api = Router::new().get("/users", list_users);
///
/// let app = Router::new()
///     .middleware("/", middleware::logger())
///     .middleware("/", middleware::json())
///     .nest("/api", api)
///     .build();
/// # let _ = app;
/// ```
#[derive(Default)]
pub struct Router {
    entries: Vec<Entry>,
}

impl Router {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Appends a fully built entry.
    pub fn mount(mut self, entry: Entry) -> Self {
        debug!(
            prefix = entry.prefix(),
            method = entry.method().map(Method::as_str),
            error_handler = entry.is_error_handler(),
            "mount"
        );
        self.entries.push(entry);
        self
    }

    /// Appends `handler` at `prefix`, restricted to `method` when given.
    pub fn route(self, prefix: &str, method: Option<Method>, handler: Handler) -> Self {
        self.mount(Entry::new(prefix, method, handler))
    }

    /// Middleware for every method under `prefix`.
    pub fn middleware(self, prefix: &str, m: impl Middleware) -> Self {
        self.route(prefix, None, Handler::normal(m))
    }

    /// Handler for one method under `path`.
    pub fn on(self, method: Method, path: &str, m: impl Middleware) -> Self {
        self.route(path, Some(method), Handler::normal(m))
    }

    /// Error handler under `prefix`. Prefix matching applies to error
    /// handlers exactly as to normal ones.
    pub fn error(self, prefix: &str, m: impl ErrorMiddleware) -> Self {
        self.route(prefix, None, Handler::error(m))
    }

    /// Mounts `router` under `prefix`. It sees paths with the prefix
    /// stripped; if none of its entries finalize, the walk continues here.
    pub fn nest(self, prefix: &str, router: impl Into<Dispatcher>) -> Self {
        self.route(prefix, None, Handler::nested(router))
    }

    /// Freezes the entry list.
    pub fn build(self) -> Dispatcher {
        Dispatcher::new(self.entries)
    }
}

macro_rules! method_route {
    ($name:ident => Method::$method:ident) => {
        #[doc = concat!("Shorthand for [`Router::on`] with `Method::", stringify!($method), "`.")]
        pub fn $name(self, path: &str, m: impl Middleware) -> Self {
            self.on(Method::$method, path, m)
        }
    };
}

impl Router {
    method_route!(get => Method::Get);
    method_route!(post => Method::Post);
    method_route!(put => Method::Put);
    method_route!(delete => Method::Delete);
    method_route!(patch => Method::Patch);
    method_route!(head => Method::Head);
    method_route!(options => Method::Options);
}

impl From<Router> for Dispatcher {
    fn from(router: Router) -> Self {
        router.build()
    }
}
