//! Built-in middleware.
//!
//! These are ordinary entries. They get no special treatment from the
//! dispatcher and obey the same ordering rule as everything else: mount a
//! body parser before any handler that reads `"body"`.
//!
//! ```rust
//! use passage::{Router, middleware};
//!
//! let app = Router::new()
//!     .middleware("/", middleware::logger())
//!     .middleware("/", middleware::json())
//!     .middleware("/", middleware::urlencoded());
//! # let _ = app;
//! ```

mod body;
mod logger;

pub use body::{json, urlencoded, JsonBody, UrlEncodedBody, BODY};
pub use logger::{logger, Logger, STARTED_AT};
