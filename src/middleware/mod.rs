//! Middleware layer.
//!
//! A [`Middleware`] turns one handler into another. Layers are composed as an
//! onion: for `[M1, M2, …, Mn]` around handler `H` the result is
//! `M1(M2(…Mn(H)))`, so `M1` runs first on the way in and last on the way out.
//!
//! Order is observable. The standard stack from [`standard`] is
//!
//! ```text
//! Logger → Errors → Metrics → Panics → [route middleware] → handler
//! ```
//!
//! `Panics` sits innermost so it recovers panics from route middleware and
//! business code only. A panic in an outer layer is not its concern.
//!
//! Two lists are composed per route: the route's own middleware wraps the
//! handler first, then the router-wide list wraps the result.

mod auth;
mod errors;
mod logger;
mod metrics;
mod panics;

use std::sync::Arc;

use crate::handler::BoxedHandler;
use crate::metrics::Collector;

pub use auth::{Authenticate, Authorize};
pub use errors::Errors;
pub use logger::Logger;
pub use metrics::Metrics;
pub use panics::{Panic, Panics};

/// A cross-cutting wrapper around a handler.
///
/// Implementations are stateless apart from the collaborators they close
/// over (metrics collector, verifier).
pub trait Middleware: Send + Sync + 'static {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler;
}

/// Shared middleware handle, as stored by the router.
pub type Layer = Arc<dyn Middleware>;

/// Wraps `handler` in `layers`, first element outermost.
///
/// An empty list returns `handler` unchanged.
pub fn compose(layers: &[Layer], handler: BoxedHandler) -> BoxedHandler {
    layers.iter().rev().fold(handler, |inner, layer| layer.wrap(inner))
}

/// Adapts a plain function into a [`Middleware`].
pub fn from_fn<F>(f: F) -> Layer
where
    F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
{
    Arc::new(FromFn(f))
}

struct FromFn<F>(F);

impl<F> Middleware for FromFn<F>
where
    F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
{
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        (self.0)(next)
    }
}

/// The service-wide stack: Logger → Errors → Metrics → Panics.
pub fn standard(collector: Arc<dyn Collector>) -> Vec<Layer> {
    vec![
        Arc::new(Logger),
        Arc::new(Errors),
        Arc::new(Metrics::new(Arc::clone(&collector))),
        Arc::new(Panics::new(collector)),
    ]
}
