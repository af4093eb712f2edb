//! HTTP server and graceful shutdown.
//!
//! The server is the boundary around the dispatcher. For every request it:
//!
//! 1. collects the body and builds a fresh [`Context`] carrying the
//!    configured deadline;
//! 2. dispatches it;
//! 3. writes the finalized response, or hands [`Unhandled`] to
//!    [`fallback::respond`] for the default 404 / 500.
//!
//! Nothing a handler does can make hyper see an error.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//!
//! The server reacts by:
//! 1. Immediately stopping `listener.accept()` — no new connections are made.
//! 2. Letting every in-flight connection task run to completion.
//! 3. Returning from [`Server::serve`], which lets `main` exit cleanly.
//!
//! Keep `request_timeout_ms` below the grace period so stalled requests are
//! cut off before the pod is killed.
//!
//! [`Unhandled`]: crate::Unhandled

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::{Config, Environment};
use crate::context::Context;
use crate::dispatcher::Dispatcher;
use crate::error::Error;
use crate::fallback;
use crate::method::Method;
use crate::response::Response;

/// The HTTP server.
pub struct Server {
    addr: String,
    environment: Environment,
    request_timeout: Option<Duration>,
}

/// What every connection task needs to handle a request.
struct Shared {
    dispatcher: Dispatcher,
    environment: Environment,
    request_timeout: Option<Duration>,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called. Development environment, no request deadline.
    ///
    /// ```rust
    /// use passage::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: &str) -> Self {
        Self { addr: addr.to_owned(), environment: Environment::Development, request_timeout: None }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            addr: config.addr.clone(),
            environment: config.environment,
            request_timeout: config.request_timeout(),
        }
    }

    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Deadline applied to every request, measured from when its body has
    /// been read.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Starts accepting connections and dispatching them.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing).
    pub async fn serve(self, app: impl Into<Dispatcher>) -> Result<(), Error> {
        self.serve_with_shutdown(app, shutdown_signal()).await
    }

    /// Like [`serve`](Server::serve), but stops accepting when `signal`
    /// resolves instead of on SIGTERM / Ctrl-C.
    pub async fn serve_with_shutdown(
        self,
        app: impl Into<Dispatcher>,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let addr: SocketAddr = self.addr.parse()
            .map_err(|source| Error::Addr { addr: self.addr.clone(), source })?;
        let listener = TcpListener::bind(addr).await?;

        let shared = Arc::new(Shared {
            dispatcher: app.into(),
            environment: self.environment,
            request_timeout: self.request_timeout,
        });

        info!(
            addr = %addr,
            environment = ?shared.environment,
            entries = shared.dispatcher.entries().len(),
            "passage listening"
        );

        let mut tasks = tokio::task::JoinSet::new();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a SIGTERM immediately stops
                // accepting new connections, even if more are queued.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let shared = Arc::clone(&shared);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let shared = Arc::clone(&shared);
                            async move { Ok::<_, Infallible>(handle(&shared, req).await) }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("passage stopped");
        Ok(())
    }
}

// ── Request handling ──────────────────────────────────────────────────────────

/// One request in, one response out.
async fn handle<B>(shared: &Shared, req: http::Request<B>) -> http::Response<Full<Bytes>>
where
    B: hyper::body::Body,
    B::Error: std::fmt::Display,
{
    let span = info_span!("request", method = %req.method(), path = req.uri().path());
    let started = Instant::now();

    let response = respond(shared, req).instrument(span.clone()).await;

    span.in_scope(|| {
        info!(
            status = response.status_code().as_u16(),
            latency_ms = started.elapsed().as_millis() as u64,
            "completed"
        );
    });
    response.into_http()
}

async fn respond<B>(shared: &Shared, req: http::Request<B>) -> Response
where
    B: hyper::body::Body,
    B::Error: std::fmt::Display,
{
    let Ok(method) = Method::try_from(req.method()) else {
        return Response::status(StatusCode::METHOD_NOT_ALLOWED);
    };

    let target = req.uri().path_and_query().map_or("/", |pq| pq.as_str()).to_owned();
    let (parts, body) = req.into_parts();

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("failed to read request body: {e}");
            return Response::status(StatusCode::BAD_REQUEST);
        }
    };

    let mut cx = Context::new(method, &target)
        .with_headers(parts.headers)
        .with_body(body);
    if let Some(timeout) = shared.request_timeout {
        cx = cx.with_timeout(timeout);
    }

    match shared.dispatcher.dispatch(cx).await {
        Ok(finalized) => finalized.into_response(),
        Err(unhandled) => fallback::respond(unhandled, shared.environment),
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** and **SIGINT** (Ctrl-C).
/// On Windows only Ctrl-C is available. A handler that cannot be installed
/// is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => { sig.recv().await; }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    // `pending()` is a future that never resolves — on non-Unix platforms
    // the SIGTERM arm is effectively disabled.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BoxFuture, Next, Router};

    fn hello(cx: &mut Context, _next: Next) -> BoxFuture<'_> {
        Box::pin(async move {
            let q = cx.query().unwrap_or_default().to_owned();
            cx.send(format!("hello {q}"))
        })
    }

    fn boom(_cx: &mut Context, next: Next) -> BoxFuture<'_> {
        next.fail(crate::HandlerError::internal("secret stack"));
        Box::pin(async {})
    }

    fn stall(_cx: &mut Context, next: Next) -> BoxFuture<'_> {
        Box::pin(async move {
            let _next = next;
            std::future::pending::<()>().await;
        })
    }

    fn shared(environment: Environment, request_timeout: Option<Duration>) -> Shared {
        let dispatcher = Router::new()
            .get("/hello", hello)
            .get("/boom", boom)
            .get("/stall", stall)
            .build();
        Shared { dispatcher, environment, request_timeout }
    }

    fn get(uri: &str) -> http::Request<Full<Bytes>> {
        http::Request::builder().uri(uri).body(Full::new(Bytes::new())).unwrap()
    }

    async fn body(res: http::Response<Full<Bytes>>) -> String {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn finalized_response_is_written() {
        let res = handle(&shared(Environment::Production, None), get("/hello?who=world")).await;

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body(res).await, "hello who=world");
    }

    #[tokio::test]
    async fn unmatched_path_is_404() {
        let res = handle(&shared(Environment::Production, None), get("/nowhere")).await;

        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(body(res).await, "Cannot GET /nowhere");
    }

    #[tokio::test]
    async fn production_hides_internal_errors() {
        let res = handle(&shared(Environment::Production, None), get("/boom")).await;

        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body(res).await.contains("secret stack"));
    }

    #[tokio::test]
    async fn development_shows_internal_errors() {
        let res = handle(&shared(Environment::Development, None), get("/boom")).await;
        assert!(body(res).await.contains("secret stack"));
    }

    #[tokio::test]
    async fn unrendered_timeout_is_answered_with_500() {
        let shared = shared(Environment::Production, Some(Duration::from_millis(20)));
        let res = handle(&shared, get("/stall")).await;

        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body(res).await, "Internal Server Error");
    }

    #[tokio::test]
    async fn unknown_method_is_405() {
        let req = http::Request::builder()
            .method(http::Method::from_bytes(b"PURGE").unwrap())
            .uri("/hello")
            .body(Full::new(Bytes::new()))
            .unwrap();

        let res = handle(&shared(Environment::Production, None), req).await;
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn bad_address_is_reported() {
        let err = Server::bind("not-an-address")
            .serve_with_shutdown(Router::new(), async {})
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Addr { .. }));
    }
}
