use std::sync::Arc;

use super::Middleware;
use crate::handler::{BoxedHandler, handler_fn};
use crate::metrics::Collector;

/// Live-task sampling is more expensive than a counter bump, so only every
/// Nth request pays for it.
const SAMPLE_EVERY: u64 = 1000;

/// Counts requests and errors.
///
/// Sits inside Errors, so it still sees the error a handler returned before
/// it is turned into a response.
pub struct Metrics {
    collector: Arc<dyn Collector>,
}

impl Metrics {
    pub fn new(collector: Arc<dyn Collector>) -> Self {
        Self { collector }
    }
}

impl Middleware for Metrics {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let collector = Arc::clone(&self.collector);
        handler_fn(move |cx, req| {
            let next = Arc::clone(&next);
            let collector = Arc::clone(&collector);
            Box::pin(async move {
                let res = next.call(cx, req).await;

                let n = collector.increment_requests();
                if n % SAMPLE_EVERY == 0 {
                    collector.sample_tasks();
                }
                if res.is_err() {
                    collector.increment_errors();
                }

                res
            })
        })
    }
}
