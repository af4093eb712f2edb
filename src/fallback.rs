//! Default responses for requests no handler finalized.
//!
//! Only the outermost [`Unhandled`] reaches this policy. An error that no
//! error handler rendered is always answered with a `500`; its own status is
//! for error handlers to use. What the client sees of it depends on the
//! [`Environment`]: development shows the error message and its cause chain,
//! production shows the reason phrase only.

use std::error::Error as _;
use std::fmt::Write as _;

use http::StatusCode;
use tracing::{debug, error};

use crate::config::Environment;
use crate::dispatcher::Unhandled;
use crate::error::HandlerError;
use crate::response::Response;

/// Produces the response for an unhandled request.
///
/// - no error → `404` with `Cannot {METHOD} {path}`
/// - error → `500`, with a body redacted according to `env`
pub fn respond(unhandled: Unhandled, env: Environment) -> Response {
    let method = unhandled.method();
    let path = unhandled.path().to_owned();

    let Some(err) = unhandled.into_error() else {
        debug!(%method, path = %path, "no entry finalized the request");
        return Response::builder()
            .status(StatusCode::NOT_FOUND)
            .text(format!("Cannot {method} {path}"));
    };

    error!(
        %method,
        path = %path,
        error_status = err.status().as_u16(),
        kind = ?err.kind(),
        error = %err,
        "unhandled error"
    );

    let status = StatusCode::INTERNAL_SERVER_ERROR;
    Response::builder()
        .status(status)
        .header("x-content-type-options", "nosniff")
        .text(render(&err, status, env))
}

fn render(err: &HandlerError, status: StatusCode, env: Environment) -> String {
    match env {
        Environment::Production => status.canonical_reason().unwrap_or("Error").to_owned(),
        Environment::Development => {
            let mut body = format!("{status}: {err} ({})", err.status());
            let mut cause = err.source();
            while let Some(source) = cause {
                let _ = write!(body, "\ncaused by: {source}");
                cause = source.source();
            }
            body
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BoxFuture, Context, Method, Middleware, Next, Router};

    struct FailWith(fn() -> HandlerError);

    impl Middleware for FailWith {
        fn call<'a>(&'a self, _cx: &'a mut Context, next: Next) -> BoxFuture<'a> {
            next.fail((self.0)());
            Box::pin(async {})
        }
    }

    struct Stall;

    impl Middleware for Stall {
        fn call<'a>(&'a self, _cx: &'a mut Context, next: Next) -> BoxFuture<'a> {
            Box::pin(async move {
                let _next = next;
                std::future::pending::<()>().await;
            })
        }
    }

    async fn unhandled(fail: Option<fn() -> HandlerError>) -> Unhandled {
        let app = match fail {
            Some(f) => Router::new().middleware("/", FailWith(f)).build(),
            None => Router::new().build(),
        };
        app.dispatch(Context::new(Method::Get, "/secret")).await.unwrap_err()
    }

    #[tokio::test]
    async fn not_found_names_method_and_path() {
        let res = respond(unhandled(None).await, Environment::Production);

        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(res.body(), b"Cannot GET /secret");
    }

    #[tokio::test]
    async fn production_redacts_server_errors() {
        let err: fn() -> HandlerError = || HandlerError::internal(std::io::Error::other("db password is hunter2"));
        let res = respond(unhandled(Some(err)).await, Environment::Production);

        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body(), b"Internal Server Error");
    }

    #[tokio::test]
    async fn unrendered_client_error_is_still_500() {
        let err: fn() -> HandlerError = || HandlerError::new(StatusCode::BAD_REQUEST, "name is required");
        let res = respond(unhandled(Some(err)).await, Environment::Production);

        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body(), b"Internal Server Error");
        assert_eq!(res.header("x-content-type-options"), Some("nosniff"));
    }

    #[tokio::test]
    async fn development_shows_message_status_and_cause_chain() {
        let err: fn() -> HandlerError = || {
            HandlerError::new(StatusCode::BAD_GATEWAY, "upstream failed")
                .with_source(std::io::Error::other("connection reset"))
        };
        let res = respond(unhandled(Some(err)).await, Environment::Development);

        let body = std::str::from_utf8(res.body()).unwrap();
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.starts_with("500 Internal Server Error: upstream failed (502 Bad Gateway)"));
        assert!(body.contains("caused by: connection reset"));
    }

    #[tokio::test]
    async fn unrendered_timeout_is_500() {
        let app = Router::new().middleware("/", Stall).build();
        let cx = Context::new(Method::Get, "/slow").with_timeout(std::time::Duration::from_millis(10));

        let res = respond(app.dispatch(cx).await.unwrap_err(), Environment::Production);
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
