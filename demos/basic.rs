//! Minimal passage example: a logged, authenticated JSON API.
//!
//! Run with:
//!   PASSAGE_ENV=development cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/api/users                                  # 403
//!   curl -H 'authorization: Bearer demo' http://localhost:3000/api/users  # 200
//!   curl -X POST -H 'authorization: Bearer demo' \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice"}' http://localhost:3000/api/users            # 201
//!   curl -X POST -H 'authorization: Bearer demo' \
//!        -H 'content-type: application/json' \
//!        -d '{nope' http://localhost:3000/api/users                       # 400
//!   curl http://localhost:3000/nowhere                                    # 404 (catch-all)

use http::StatusCode;
use passage::handler::from_fn;
use passage::middleware::{self, BODY};
use passage::{BoxFuture, Config, Context, HandlerError, Next, Response, Router, Server};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();

    let api = Router::new()
        .get("/users", list_users)
        .post("/users", create_user);

    let app = Router::new()
        .middleware("/", middleware::logger())
        .middleware("/", middleware::json())
        .middleware("/api", require_token)
        .nest("/api", api)
        .middleware("/", from_fn(|cx, _next| Box::pin(async move {
            cx.send((StatusCode::NOT_FOUND, "no such route"));
        })))
        .error("/", render_error);

    if let Err(e) = Server::from_config(&config).serve(app).await {
        eprintln!("server error: {e}");
        std::process::exit(1);
    }
}

// Every /api request needs a bearer token.
fn require_token(cx: &mut Context, next: Next) -> BoxFuture<'_> {
    Box::pin(async move {
        match cx.header("authorization") {
            Some(v) if v.starts_with("Bearer ") => next.proceed(),
            _ => cx.send((StatusCode::FORBIDDEN, "missing bearer token")),
        }
    })
}

// GET /api/users
fn list_users(cx: &mut Context, _next: Next) -> BoxFuture<'_> {
    Box::pin(async move {
        cx.send(Response::json(br#"[{"id":"42","name":"alice"}]"#.to_vec()));
    })
}

// POST /api/users. The JSON parser above has already run.
fn create_user(cx: &mut Context, next: Next) -> BoxFuture<'_> {
    Box::pin(async move {
        let name = cx
            .get::<serde_json::Value>(BODY)
            .and_then(|body| body["name"].as_str())
            .map(str::to_owned);

        match name {
            Some(name) => cx.send(
                Response::builder()
                    .status(StatusCode::CREATED)
                    .header("location", "/api/users/99")
                    .json(format!(r#"{{"id":"99","name":"{name}"}}"#).into_bytes()),
            ),
            None => next.fail(HandlerError::new(StatusCode::UNPROCESSABLE_ENTITY, "name is required")),
        }
    })
}

// Renders every error as JSON. 5xx messages stay generic.
fn render_error<'a>(err: &'a HandlerError, cx: &'a mut Context, _next: Next) -> BoxFuture<'a> {
    Box::pin(async move {
        let message = if err.is_exposed() { err.message() } else { "internal error" };
        let body = serde_json::json!({ "error": message }).to_string();
        cx.send(Response::builder().status(err.status()).json(body.into_bytes()));
    })
}
