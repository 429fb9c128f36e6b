//! Built-in Kubernetes health-check handlers.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the pod serve traffic? Failure → pulled from load-balancer. |
//!
//! Register them like any other route:
//!
//! ```rust,no_run
//! use http::Method;
//! use ward::{Router, health, shutdown};
//!
//! # fn main() -> Result<(), ward::ServeError> {
//! let (tx, _rx) = shutdown::channel();
//! let app = Router::new(tx, Vec::new())
//!     .on(Method::GET, "/healthz", health::liveness)?
//!     .on(Method::GET, "/readyz", health::readiness)?;
//! # Ok(())
//! # }
//! ```
//!
//! Replace `readiness` with your own handler if the pod must gate on
//! dependency availability (database connections, downstream services).

use http::StatusCode;
use serde::Serialize;

use crate::{Context, Error, Request, Response};

#[derive(Serialize)]
struct Status {
    status: &'static str,
}

/// Always `200 OK` with `{"status":"ok"}`. Checks no dependencies.
pub async fn liveness(_cx: Context, _req: Request) -> Result<Response, Error> {
    Response::json(StatusCode::OK, &Status { status: "ok" })
}

/// Default readiness: `200 OK` with `{"status":"ready"}`.
pub async fn readiness(_cx: Context, _req: Request) -> Result<Response, Error> {
    Response::json(StatusCode::OK, &Status { status: "ready" })
}
