//! Per-request context.
//!
//! The dispatcher allocates one [`Context`] per matched request and passes it
//! by value through every layer of the chain. Clones share the same
//! underlying values, so what an inner layer records (the response, the
//! status code) is visible to outer layers once the inner call returns.
//! A context never outlives its request and is never handed to another one.
//!
//! # Field lifecycle
//!
//! | Field | Written by | Readable |
//! |---|---|---|
//! | `trace_id` | dispatcher, at allocation | always |
//! | `started` | Logger middleware, on entry | only after Logger has run; `None` before |
//! | `status` / response | the response-writing step, once | after the handler returns |
//! | `claims` | Authenticate middleware | by layers inside Authenticate |

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use http::StatusCode;
use tracing::warn;
use uuid::Uuid;

use crate::auth::Claims;
use crate::response::Response;

/// Per-request values: trace id, start time, status and the written response.
#[derive(Clone, Debug)]
pub struct Context {
    values: Arc<Values>,
    claims: Option<Arc<Claims>>,
}

#[derive(Debug)]
struct Values {
    trace_id: String,
    started: OnceLock<Instant>,
    status: AtomicU16,
    response: Mutex<Option<Response>>,
}

impl Context {
    /// A fresh context with a new random trace id and no status.
    pub fn new() -> Self {
        Self::with_trace_id(Uuid::new_v4().to_string())
    }

    pub fn with_trace_id(trace_id: impl Into<String>) -> Self {
        Self {
            values: Arc::new(Values {
                trace_id: trace_id.into(),
                started: OnceLock::new(),
                status: AtomicU16::new(0),
                response: Mutex::new(None),
            }),
            claims: None,
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.values.trace_id
    }

    /// Records the request start time. Only the first call takes effect.
    pub fn mark_started(&self) {
        let _ = self.values.started.set(Instant::now());
    }

    /// `None` until the Logger middleware has run.
    pub fn started(&self) -> Option<Instant> {
        self.values.started.get().copied()
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.started().map(|t| t.elapsed())
    }

    /// Status of the written response; `None` if nothing was written yet.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self.values.status.load(Ordering::Acquire) {
            0 => None,
            code => StatusCode::from_u16(code).ok(),
        }
    }

    /// Writes the response for this request.
    ///
    /// A request gets exactly one response. A second write is dropped and
    /// logged; the return value tells the caller whether this write won.
    pub fn respond(&self, response: Response) -> bool {
        let mut slot = self.values.response.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            warn!(trace_id = %self.trace_id(), status = %response.status_code(), "response already written, dropping second write");
            return false;
        }
        self.values.status.store(response.status_code().as_u16(), Ordering::Release);
        *slot = Some(response);
        true
    }

    pub fn is_written(&self) -> bool {
        self.status_code().is_some()
    }

    pub(crate) fn take_response(&self) -> Option<Response> {
        self.values.response.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Claims attached by the Authenticate middleware.
    pub fn claims(&self) -> Option<&Claims> {
        self.claims.as_deref()
    }

    /// A context for the inner layers carrying `claims`. Shares every other value.
    pub fn with_claims(&self, claims: Claims) -> Self {
        Self { values: Arc::clone(&self.values), claims: Some(Arc::new(claims)) }
    }
}

impl Default for Context {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_time_is_absent_until_marked() {
        let cx = Context::new();
        assert!(cx.started().is_none());
        cx.mark_started();
        assert!(cx.started().is_some());
    }

    #[test]
    fn first_response_wins() {
        let cx = Context::new();
        assert!(cx.respond(Response::status(StatusCode::CREATED)));
        assert!(!cx.clone().respond(Response::status(StatusCode::OK)));
        assert_eq!(cx.status_code(), Some(StatusCode::CREATED));
        assert_eq!(cx.take_response().map(|r| r.status_code()), Some(StatusCode::CREATED));
    }

    #[test]
    fn trace_ids_are_unique() {
        assert_ne!(Context::new().trace_id(), Context::new().trace_id());
    }
}
