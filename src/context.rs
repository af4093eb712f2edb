//! Per-request state.
//!
//! One [`Context`] is created for each incoming request and owned by the
//! dispatcher's walk for that request. Handlers borrow it mutably, one at a
//! time, in mount order; it is dropped once the response has been produced.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue};
use tokio::time::Instant;
use tracing::warn;

use crate::error::HandlerError;
use crate::method::Method;
use crate::response::{IntoResponse, Response};

// ── Attributes ────────────────────────────────────────────────────────────────

/// String-keyed, type-erased values attached by middleware: auth results,
/// parsed bodies, timers. Visible to every handler invoked later in the same
/// walk, never across requests.
#[derive(Default)]
pub struct Attributes {
    map: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Attributes {
    /// Stores `value` under `key`, replacing whatever was there.
    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.map.insert(key.into(), Box::new(value));
    }

    /// Returns the value under `key` if present and of type `T`.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.map.get(key)?.downcast_ref()
    }

    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.map.get_mut(key)?.downcast_mut()
    }

    /// Removes and returns the value under `key`. A value of another type is
    /// left in place.
    pub fn remove<T: Any>(&mut self, key: &str) -> Option<T> {
        if !self.map.get(key)?.is::<T>() {
            return None;
        }
        let boxed = self.map.remove(key)?.downcast::<T>().ok()?;
        Some(*boxed)
    }

    pub fn contains(&self, key: &str) -> bool { self.map.contains_key(key) }
    pub fn len(&self) -> usize { self.map.len() }
    pub fn is_empty(&self) -> bool { self.map.is_empty() }
}

impl fmt::Debug for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.map.keys()).finish()
    }
}

// ── Context ───────────────────────────────────────────────────────────────────

/// The state of one request as it moves through the dispatcher.
///
/// ```rust
/// use passage::{Context, Method};
///
/// let cx = Context::new(Method::Get, "/api/users?page=2")
///     .with_header("authorization", "Bearer abc");
///
/// assert_eq!(cx.path(), "/api/users");
/// assert_eq!(cx.query(), Some("page=2"));
/// assert_eq!(cx.header("Authorization"), Some("Bearer abc"));
/// ```
pub struct Context {
    method: Method,
    path: String,
    original_path: String,
    base_path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
    attributes: Attributes,
    response: Option<Response>,
    violation: bool,
    error: Option<HandlerError>,
    deadline: Option<Instant>,
}

/// Path state saved while a nested dispatcher runs.
pub(crate) struct Mounted {
    path: String,
    base_len: usize,
}

impl Context {
    /// Creates a context for `method` on `target`, a request path optionally
    /// followed by `?query`.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query.to_owned())),
            None => (target, None),
        };
        let path = if path.is_empty() { "/" } else { path };

        Self {
            method,
            path: path.to_owned(),
            original_path: path.to_owned(),
            base_path: String::new(),
            query,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            attributes: Attributes::default(),
            response: None,
            violation: false,
            error: None,
            deadline: None,
        }
    }

    /// Adds a request header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => { self.headers.append(name, value); }
            _ => warn!(header = %name, "ignoring invalid request header"),
        }
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Gives the request until `deadline` to be finalized.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Gives the request `timeout` from now to be finalized.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn method(&self) -> Method { self.method }

    /// The path relative to the dispatcher currently walking: a nested
    /// dispatcher mounted at `/api` sees `/users` for `/api/users`.
    pub fn path(&self) -> &str { &self.path }

    /// The request path as it arrived, before any prefix was stripped.
    pub fn original_path(&self) -> &str { &self.original_path }

    /// The prefixes stripped by the nested dispatchers entered so far.
    pub fn base_path(&self) -> &str { &self.base_path }

    pub fn query(&self) -> Option<&str> { self.query.as_deref() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }
    pub fn deadline(&self) -> Option<Instant> { self.deadline }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    pub fn attributes(&self) -> &Attributes { &self.attributes }
    pub fn attributes_mut(&mut self) -> &mut Attributes { &mut self.attributes }

    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.attributes.insert(key, value);
    }

    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.attributes.get(key)
    }

    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.attributes.get_mut(key)
    }

    pub fn remove<T: Any>(&mut self, key: &str) -> Option<T> {
        self.attributes.remove(key)
    }

    /// The error the request is currently carrying, if any.
    ///
    /// While an error handler runs, the error is handed to it directly and
    /// this returns `None`.
    pub fn error(&self) -> Option<&HandlerError> { self.error.as_ref() }

    /// Finalizes the request with `response`.
    ///
    /// Only the first call per request is honoured. A second call leaves the
    /// first response in place and is reported to the dispatcher as a
    /// contract violation.
    pub fn send(&mut self, response: impl IntoResponse) {
        if self.response.is_some() {
            warn!(path = %self.original_path, "response already sent; rejecting second write");
            self.violation = true;
            return;
        }
        self.response = Some(response.into_response());
    }

    /// `true` once a handler has called [`send`](Self::send).
    pub fn response_started(&self) -> bool { self.response.is_some() }

    // ── Dispatcher-only plumbing ─────────────────────────────────────────────

    pub(crate) fn set_error(&mut self, err: HandlerError) {
        self.error = Some(err);
    }

    pub(crate) fn take_error(&mut self) -> Option<HandlerError> {
        self.error.take()
    }

    pub(crate) fn in_error(&self) -> bool { self.error.is_some() }

    pub(crate) fn take_violation(&mut self) -> bool {
        std::mem::take(&mut self.violation)
    }

    pub(crate) fn discard_response(&mut self) {
        self.response = None;
    }

    pub(crate) fn take_response(&mut self) -> Option<Response> {
        self.response.take()
    }

    /// Strips `prefix` (already matched at a segment boundary) from the
    /// visible path and records it in the base path.
    pub(crate) fn enter(&mut self, prefix: &str) -> Mounted {
        let residual = match self.path.get(prefix.len()..) {
            Some(rest) if !rest.is_empty() => rest.to_owned(),
            _ => "/".to_owned(),
        };
        let saved = Mounted {
            path: std::mem::replace(&mut self.path, residual),
            base_len: self.base_path.len(),
        };
        self.base_path.push_str(prefix);
        saved
    }

    pub(crate) fn leave(&mut self, saved: Mounted) {
        self.path = saved.path;
        self.base_path.truncate(saved.base_len);
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("base_path", &self.base_path)
            .field("attributes", &self.attributes)
            .field("response_started", &self.response.is_some())
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}
