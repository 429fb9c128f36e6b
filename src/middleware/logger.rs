use std::sync::Arc;

use tracing::info;

use super::Middleware;
use crate::handler::{BoxedHandler, handler_fn};

/// Logs request start and completion.
///
/// This is where the request clock starts: [`Context::started`](crate::Context::started)
/// is `None` until this layer has run.
pub struct Logger;

impl Middleware for Logger {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        handler_fn(move |cx, req| {
            let next = Arc::clone(&next);
            Box::pin(async move {
                cx.mark_started();

                let method = req.method().clone();
                let path = req.path_and_query().to_owned();
                let remote_addr = req.remote_addr();

                info!(trace_id = %cx.trace_id(), %method, %path, ?remote_addr, "request started");

                let res = next.call(cx.clone(), req).await;

                info!(
                    trace_id = %cx.trace_id(),
                    %method,
                    %path,
                    ?remote_addr,
                    status_code = cx.status_code().map_or(0, |s| s.as_u16()),
                    since = ?cx.elapsed().unwrap_or_default(),
                    "request completed"
                );

                res
            })
        })
    }
}
