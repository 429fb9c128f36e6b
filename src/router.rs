//! Routing and per-request dispatch.
//!
//! One radix tree per HTTP method, O(path-length) lookup via [`matchit`].
//! Middleware is composed once at registration time, so the hot path is a
//! lookup, one context allocation and the call into the prebuilt chain.

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;
use tracing::{error, warn};

use crate::context::Context;
use crate::error::{ErrorResponse, ServeError};
use crate::handler::{BoxedHandler, Handler};
use crate::middleware::{Layer, compose};
use crate::request::Request;
use crate::response::Response;
use crate::shutdown::{Shutdown, Signal};

/// The application router.
///
/// Holds the router-wide middleware (fixed for the life of the process) and
/// the sending half of the shutdown channel. Build it once at startup; pass
/// it to [`Server::serve`](crate::Server::serve).
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    layers: Vec<Layer>,
    shutdown: Shutdown,
}

impl Router {
    /// `layers` wrap every route, first element outermost.
    pub fn new(shutdown: Shutdown, layers: Vec<Layer>) -> Self {
        Self { routes: HashMap::new(), layers, shutdown }
    }

    /// Register a handler for a method + path pair. Returns `self` for chaining.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them:
    ///
    /// ```rust,no_run
    /// # use http::{Method, StatusCode};
    /// # use ward::{Context, Error, Request, Router, shutdown};
    /// # async fn get_user(_: Context, _: Request) -> Result<StatusCode, Error> { Ok(StatusCode::OK) }
    /// # async fn create_user(_: Context, _: Request) -> Result<StatusCode, Error> { Ok(StatusCode::OK) }
    /// # fn main() -> Result<(), ward::ServeError> {
    /// let (tx, _rx) = shutdown::channel();
    /// Router::new(tx, Vec::new())
    ///     .on(Method::GET,  "/users/{id}", get_user)?
    ///     .on(Method::POST, "/users",      create_user)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Result<Self, ServeError> {
        self.on_with(method, path, handler, &[])
    }

    /// Like [`on`](Router::on), with route-specific middleware applied inside
    /// the router-wide layers.
    pub fn on_with(
        mut self,
        method: Method,
        path: &str,
        handler: impl Handler,
        route_layers: &[Layer],
    ) -> Result<Self, ServeError> {
        let handler = compose(route_layers, handler.into_boxed_handler());
        let handler = compose(&self.layers, handler);
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler)
            .map_err(|source| ServeError::Route { path: path.to_owned(), source })?;
        Ok(self)
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }

    /// Routes one request and produces its response.
    ///
    /// 1. Allocates a fresh [`Context`] (new trace id, no status, no start time).
    /// 2. Runs the composed chain.
    /// 3. A shutdown error signals the process to stop; the response written
    ///    by the Errors middleware is still sent.
    /// 4. Any other error reaching this point is a bug in the chain; it is
    ///    logged and answered with a generic 500.
    pub async fn dispatch(&self, mut req: Request) -> Response {
        let Some((handler, params)) = self.lookup(req.method(), req.path()) else {
            return Response::status(StatusCode::NOT_FOUND);
        };
        req.set_params(params);

        let cx = Context::new();

        if let Err(err) = handler.call(cx.clone(), req).await {
            match err.as_shutdown() {
                Some(e) if e.is_connection_lost() => {
                    warn!(trace_id = %cx.trace_id(), error = %e, "client connection lost");
                }
                Some(e) => {
                    error!(trace_id = %cx.trace_id(), error = %e, "integrity failure, signalling shutdown");
                    self.shutdown.signal(Signal::Integrity(e.to_string()));
                }
                None => {
                    error!(trace_id = %cx.trace_id(), error = ?err, "error escaped the middleware chain");
                }
            }
        }

        cx.take_response().unwrap_or_else(|| {
            error!(trace_id = %cx.trace_id(), "no response written");
            fallback()
        })
    }
}

fn fallback() -> Response {
    let body = ErrorResponse {
        error: "Internal Server Error".to_owned(),
        fields: None,
    };
    Response::json(StatusCode::INTERNAL_SERVER_ERROR, &body)
        .unwrap_or_else(|_| Response::status(StatusCode::INTERNAL_SERVER_ERROR))
}
