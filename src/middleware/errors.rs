use std::sync::Arc;

use http::StatusCode;
use tracing::error;

use super::Middleware;
use crate::error::classify;
use crate::handler::{BoxedHandler, handler_fn};
use crate::response::Response;

/// Turns errors from the inner chain into uniform JSON responses.
///
/// Every error is logged with its full detail, then classified and written.
/// Afterwards only a shutdown error is passed outward; everything else is
/// finished and swallowed.
pub struct Errors;

impl Middleware for Errors {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        handler_fn(move |cx, req| {
            let next = Arc::clone(&next);
            Box::pin(async move {
                let Err(err) = next.call(cx.clone(), req).await else {
                    return Ok(());
                };

                error!(trace_id = %cx.trace_id(), error = ?err, "ERROR");

                let (status, body) = classify(&err);
                let response = Response::json(status, &body)
                    .unwrap_or_else(|_| Response::status(StatusCode::INTERNAL_SERVER_ERROR));
                cx.respond(response);

                if err.is_shutdown() { Err(err) } else { Ok(()) }
            })
        })
    }
}
