//! # ward
//!
//! A minimal HTTP service core for Rust services behind a reverse proxy.
//! Every route is wrapped in the same ordered middleware, every error reaches
//! the client as a uniform JSON body, and a handler that detects corrupted
//! state can bring the process down cleanly.
//!
//! ## The pipeline
//!
//! ```text
//! request → Router::dispatch ─ new Context (trace id)
//!             └─ Logger → Errors → Metrics → Panics → [route middleware] → handler
//!                                                                            │
//!           response ◀─ Errors writes JSON for any error ◀────── Result<_, Error>
//!           shutdown ◀─ only a ShutdownError gets past Errors
//! ```
//!
//! - Handlers return `Result<impl IntoResponse, Error>`. [`Error`] is a closed
//!   sum type: validation, request, auth, shutdown, unclassified.
//! - Panics in route middleware or handlers become unclassified errors.
//!   The process keeps running.
//! - Bearer tokens are RS256 JWTs, verified against public keys looked up by
//!   `kid`. See [`auth`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use http::{Method, StatusCode};
//! use ward::{Context, Error, Request, Response, Router, Server, metrics, middleware, shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ward::ServeError> {
//!     let (tx, rx) = shutdown::channel();
//!     let counters = Arc::new(metrics::Counters::new());
//!
//!     let app = Router::new(tx.clone(), middleware::standard(counters))
//!         .on(Method::GET, "/users/{id}", get_user)?;
//!
//!     tokio::spawn(shutdown::forward_os_signals(tx));
//!     Server::bind("0.0.0.0:3000")?.serve(app, rx).await
//! }
//!
//! async fn get_user(_cx: Context, req: Request) -> Result<Response, Error> {
//!     let Some(id) = req.param("id") else {
//!         return Err(Error::request("missing id", StatusCode::BAD_REQUEST));
//!     };
//!     Response::json(StatusCode::OK, &serde_json::json!({ "id": id }))
//! }
//! ```

mod context;
mod error;
mod request;
mod response;
mod router;
mod server;

pub mod auth;
pub mod config;
pub mod handler;
pub mod health;
pub mod metrics;
pub mod middleware;
pub mod shutdown;

pub use auth::{AuthError, Claims};
pub use context::Context;
pub use error::{
    BoxError, Error, ErrorResponse, FieldError, FieldErrors, RequestError, ServeError,
    ShutdownError, Unclassified, classify,
};
pub use handler::Handler;
pub use request::Request;
pub use response::{IntoResponse, Response};
pub use router::Router;
pub use server::Server;
