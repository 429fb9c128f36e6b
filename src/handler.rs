//! Handler trait and type erasure.
//!
//! # One signature for everything
//!
//! Business handlers and middleware layers are stored and called the same
//! way, as an `Arc<dyn ErasedHandler>`. Each layer receives the request's
//! [`Context`] and the [`Request`] and resolves to `Result<(), Error>`:
//!
//! - `Ok(())`: a response has been written to the context.
//! - `Err(e)`: exactly one error, and no response for that outcome.
//!
//! The chain from user code to vtable call is:
//!
//! ```text
//! async fn hello(cx: Context, req: Request) -> Result<Response, Error>   ← user writes this
//!        ↓ router.on(Method::GET, "/", hello)
//! hello.into_boxed_handler()                  ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(hello))                  ← writes Ok(response) into the context
//!        ↓  wrapped by each Middleware, stored as BoxedHandler
//! handler.call(cx, req) at request time       ← one vtable dispatch per layer
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;
use crate::request::Request;
use crate::response::IntoResponse;

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future resolving to a handler outcome.
///
/// `Send + 'static` let tokio move the future across threads safely.
pub type BoxFuture = Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'static>>;

/// The dispatch interface shared by business handlers and middleware layers.
///
/// Implement it directly only when writing a [`Middleware`](crate::middleware::Middleware)
/// that needs a named type; [`handler_fn`] covers the closure case.
pub trait ErasedHandler: Send + Sync + 'static {
    fn call(&self, cx: Context, req: Request) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests.
pub type BoxedHandler = Arc<dyn ErasedHandler>;

/// Builds a [`BoxedHandler`] from a closure returning a [`BoxFuture`].
///
/// This is how middleware layers are usually written:
///
/// ```rust
/// use std::sync::Arc;
/// use ward::handler::{handler_fn, BoxedHandler};
///
/// fn passthrough(next: BoxedHandler) -> BoxedHandler {
///     handler_fn(move |cx, req| {
///         let next = Arc::clone(&next);
///         Box::pin(async move { next.call(cx, req).await })
///     })
/// }
/// ```
pub fn handler_fn<F>(f: F) -> BoxedHandler
where
    F: Fn(Context, Request) -> BoxFuture + Send + Sync + 'static,
{
    Arc::new(ClosureHandler(f))
}

struct ClosureHandler<F>(F);

impl<F> ErasedHandler for ClosureHandler<F>
where
    F: Fn(Context, Request) -> BoxFuture + Send + Sync + 'static,
{
    fn call(&self, cx: Context, req: Request) -> BoxFuture {
        (self.0)(cx, req)
    }
}

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is automatically satisfied for any
/// `async fn` with the signature:
///
/// ```text
/// async fn name(cx: Context, req: Request) -> Result<impl IntoResponse, Error>
/// ```
///
/// The trait is **sealed** (via the private `Sealed` supertrait): only the
/// blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Context, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Context, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

/// Bridges a typed business handler to the erased world. On success the
/// returned value is written to the context; on failure nothing is written
/// and the error travels outward.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Context, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, cx: Context, req: Request) -> BoxFuture {
        let fut = (self.0)(cx.clone(), req);
        Box::pin(async move {
            let res = fut.await?;
            cx.respond(res.into_response());
            Ok(())
        })
    }
}
