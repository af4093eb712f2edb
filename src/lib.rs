//! # passage
//!
//! An ordered middleware chain for HTTP services behind a reverse proxy.
//!
//! ## The contract
//!
//! Every request walks one list of entries, in the order they were mounted.
//! Each matching entry does exactly one thing: answers, passes the request
//! on, or passes it on *with an error*. Once an error is set only error
//! handlers run. That is the whole model: no specificity ranking, no
//! implicit reordering, no hidden global state.
//!
//! - **Mount order is evaluation order.** A body parser mounted after the
//!   route that reads the body will never have run. passage does not guess.
//! - **Prefixes match whole segments.** `/admin` matches `/admin` and
//!   `/admin/users`, never `/administrator`.
//! - **Roles are explicit.** Normal handlers implement [`Middleware`], error
//!   handlers implement [`ErrorMiddleware`]. Nothing is inferred from a
//!   function's shape.
//! - **The continuation is single-use.** [`Next`] is consumed when called,
//!   so the chain can never be resumed twice. Sending two responses turns
//!   the request into a 500 error.
//! - **Routers nest.** A [`Router`] mounted under `/api` sees paths with
//!   `/api` stripped; if it has nothing for a path, the outer walk carries on.
//! - **Deadlines are per request.** A handler that never answers is cut off
//!   and the request is routed to error handlers with a `503`.
//!
//! What's left to the proxy and the transport: TLS, body-size limits, rate
//! limiting, slow clients.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::StatusCode;
//! use passage::{middleware, BoxFuture, Context, HandlerError, Next, Router, Server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = Router::new()
//!         .middleware("/", middleware::logger())
//!         .middleware("/", middleware::json())
//!         .middleware("/api", require_token)
//!         .get("/api/users", list_users)
//!         .error("/", render_error);
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! }
//!
//! fn require_token(cx: &mut Context, next: Next) -> BoxFuture<'_> {
//!     Box::pin(async move {
//!         match cx.header("authorization") {
//!             Some(_) => next.proceed(),
//!             None => cx.send((StatusCode::FORBIDDEN, "missing token")),
//!         }
//!     })
//! }
//!
//! fn list_users(cx: &mut Context, _next: Next) -> BoxFuture<'_> {
//!     Box::pin(async move { cx.send(passage::Response::json(b"[]".to_vec())) })
//! }
//!
//! fn render_error<'a>(err: &'a HandlerError, cx: &'a mut Context, _next: Next) -> BoxFuture<'a> {
//!     Box::pin(async move { cx.send((err.status(), err.message().to_owned())) })
//! }
//! ```

mod config;
mod context;
mod dispatcher;
mod error;
mod fallback;
mod method;
mod response;
mod router;
mod server;

pub mod handler;
pub mod middleware;

pub use config::{Config, Environment};
pub use context::{Attributes, Context};
pub use dispatcher::{Dispatcher, Finalized, Unhandled};
pub use error::{BoxError, Error, ErrorKind, HandlerError};
pub use fallback::respond as default_response;
pub use handler::{BoxFuture, ErrorMiddleware, Handler, Middleware, Next};
pub use method::{Method, UnknownMethod};
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::{matches_prefix, Entry, Router};
pub use server::Server;
