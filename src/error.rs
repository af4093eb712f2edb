//! Error types.
//!
//! Two families, never mixed:
//!
//! - [`Error`] — infrastructure failures: binding a port, parsing a socket
//!   address, loading configuration. These surface from [`Server::serve`]
//!   and [`Config::load`].
//! - [`HandlerError`] — the value a handler passes to
//!   [`Next::fail`](crate::Next::fail). It lives in the request's error state
//!   and is only ever observed by error handlers mounted after the failing
//!   entry, or by the boundary's default-response policy.
//!
//! [`Server::serve`]: crate::Server::serve
//! [`Config::load`]: crate::Config::load

use http::StatusCode;
use thiserror::Error;

/// A boxed, thread-safe error used as the optional cause of a [`HandlerError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by passage's fallible infrastructure operations.
///
/// Request-level failures are [`HandlerError`]s carried through the
/// dispatcher, never `Error`s.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{addr}`: {source}")]
    Addr {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("config: {0}")]
    Config(#[from] toml::de::Error),
}

/// What produced a [`HandlerError`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// A handler called [`Next::fail`](crate::Next::fail).
    Handler,
    /// The request deadline expired before a handler finalized the response.
    Timeout,
    /// A handler tried to send a second response.
    AlreadySent,
}

/// A request-level error carried in the dispatcher's error state.
///
/// Carries the HTTP status the boundary should answer with, a message, and
/// an `expose` flag deciding whether the message may reach the client in
/// production. Client errors (4xx) are exposed by default; server errors are
/// not.
///
/// ```rust
/// use passage::HandlerError;
/// use http::StatusCode;
///
/// let err = HandlerError::new(StatusCode::UNPROCESSABLE_ENTITY, "name is required");
/// assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
/// assert!(err.is_exposed());
/// ```
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    status: StatusCode,
    message: String,
    kind: ErrorKind,
    expose: bool,
    #[source]
    source: Option<BoxError>,
}

impl HandlerError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            kind: ErrorKind::Handler,
            expose: status.is_client_error(),
            source: None,
        }
    }

    /// `500 Internal Server Error` caused by `err`. The message is the
    /// cause's `Display` output and is not exposed in production.
    pub fn internal(err: impl Into<BoxError>) -> Self {
        let source = err.into();
        Self {
            message: source.to_string(),
            source: Some(source),
            ..Self::new(StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }

    pub(crate) fn timeout() -> Self {
        Self {
            kind: ErrorKind::Timeout,
            ..Self::new(StatusCode::SERVICE_UNAVAILABLE, "response timeout")
        }
    }

    pub(crate) fn already_sent() -> Self {
        Self {
            kind: ErrorKind::AlreadySent,
            ..Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "response sent more than once by one handler",
            )
        }
    }

    /// Attaches an underlying cause, reported in development error pages.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Overrides whether the message may be shown to clients in production.
    pub fn expose(mut self, expose: bool) -> Self {
        self.expose = expose;
        self
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn message(&self) -> &str { &self.message }
    pub fn kind(&self) -> ErrorKind { self.kind }
    pub fn is_exposed(&self) -> bool { self.expose }
}

/// `next.fail(StatusCode::FORBIDDEN)` — a bare status with its reason phrase.
impl From<StatusCode> for HandlerError {
    fn from(status: StatusCode) -> Self {
        Self::new(status, status.canonical_reason().unwrap_or("error"))
    }
}
