//! Body parsers.
//!
//! Each parser only acts when the request's `content-type` is its own and
//! the body is non-empty. The parsed value goes into the [`BODY`]
//! attribute; a malformed body fails the request with `400 Bad Request`.

use std::collections::HashMap;

use http::StatusCode;
use tracing::debug;

use crate::context::Context;
use crate::error::HandlerError;
use crate::handler::{BoxFuture, Middleware, Next};

/// Attribute holding the parsed request body.
pub const BODY: &str = "body";

/// `true` when the media type of `content-type` is `expected`, ignoring
/// parameters such as `charset`.
fn is_content_type(cx: &Context, expected: &str) -> bool {
    cx.header("content-type")
        .and_then(|v| v.split(';').next())
        .is_some_and(|media| media.trim().eq_ignore_ascii_case(expected))
}

/// Parses `application/json` into a [`serde_json::Value`].
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonBody;

pub fn json() -> JsonBody {
    JsonBody
}

impl Middleware for JsonBody {
    fn call<'a>(&'a self, cx: &'a mut Context, next: Next) -> BoxFuture<'a> {
        if !is_content_type(cx, "application/json") || cx.body().is_empty() {
            next.proceed();
            return Box::pin(async {});
        }

        match serde_json::from_slice::<serde_json::Value>(cx.body()) {
            Ok(value) => {
                cx.set(BODY, value);
                next.proceed();
            }
            Err(e) => {
                debug!(error = %e, "rejecting malformed JSON body");
                next.fail(
                    HandlerError::new(StatusCode::BAD_REQUEST, format!("invalid JSON body: {e}"))
                        .with_source(e),
                );
            }
        }
        Box::pin(async {})
    }
}

/// Parses `application/x-www-form-urlencoded` into `HashMap<String, String>`.
/// Repeated keys keep the last value.
#[derive(Clone, Copy, Debug, Default)]
pub struct UrlEncodedBody;

pub fn urlencoded() -> UrlEncodedBody {
    UrlEncodedBody
}

impl Middleware for UrlEncodedBody {
    fn call<'a>(&'a self, cx: &'a mut Context, next: Next) -> BoxFuture<'a> {
        if !is_content_type(cx, "application/x-www-form-urlencoded") || cx.body().is_empty() {
            next.proceed();
            return Box::pin(async {});
        }

        match serde_urlencoded::from_bytes::<HashMap<String, String>>(cx.body()) {
            Ok(form) => {
                cx.set(BODY, form);
                next.proceed();
            }
            Err(e) => {
                debug!(error = %e, "rejecting malformed form body");
                next.fail(
                    HandlerError::new(StatusCode::BAD_REQUEST, format!("invalid form body: {e}"))
                        .with_source(e),
                );
            }
        }
        Box::pin(async {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Method, Router};

    fn echo(cx: &mut Context, _next: Next) -> BoxFuture<'_> {
        Box::pin(async move {
            let name = cx
                .get::<serde_json::Value>(BODY)
                .and_then(|v| v["name"].as_str().map(str::to_owned))
                .or_else(|| cx.get::<HashMap<String, String>>(BODY).and_then(|f| f.get("name").cloned()))
                .unwrap_or_default();
            cx.send(name)
        })
    }

    fn app() -> crate::Dispatcher {
        Router::new()
            .middleware("/", json())
            .middleware("/", urlencoded())
            .post("/echo", echo)
            .build()
    }

    fn post(content_type: &str, body: &'static str) -> Context {
        Context::new(Method::Post, "/echo")
            .with_header("content-type", content_type)
            .with_body(body)
    }

    #[tokio::test]
    async fn parses_json_with_charset() {
        let cx = post("application/json; charset=utf-8", r#"{"name":"alice"}"#);

        let done = app().dispatch(cx).await.unwrap();
        assert_eq!(done.response().body(), b"alice");
    }

    #[tokio::test]
    async fn malformed_json_fails_with_400() {
        let unhandled = app().dispatch(post("application/json", "{nope")).await.unwrap_err();
        let err = unhandled.into_error().unwrap();

        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.message().starts_with("invalid JSON body"));
    }

    #[tokio::test]
    async fn parses_urlencoded_forms() {
        let cx = post("application/x-www-form-urlencoded", "name=bob&role=admin");
        let done = app().dispatch(cx).await.unwrap();
        assert_eq!(done.response().body(), b"bob");
    }

    #[tokio::test]
    async fn other_content_types_pass_through() {
        let done = app().dispatch(post("text/plain", "{nope")).await.unwrap();
        assert_eq!(done.response().body(), b"");
    }
}
