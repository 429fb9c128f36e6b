//! Panic recovery at the handler boundary.
//!
//! A panic raised while the inner chain is being polled is caught here and
//! turned into an ordinary unclassified [`Error`], so the Errors middleware
//! handles it like any returned error. The panic never travels past this
//! layer.
//!
//! # Stack traces
//!
//! By the time `catch_unwind` returns, the panicking frames are gone. To keep
//! the trace of the panic site, a process-wide panic hook (installed once)
//! captures a backtrace into a thread-local while a guarded poll is on the
//! stack. Panics outside a guarded poll go to the previously installed hook
//! untouched.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Once};
use std::task::{self, Poll};

use futures::FutureExt;

use super::Middleware;
use crate::error::{Error, Unclassified};
use crate::handler::{BoxFuture, BoxedHandler, handler_fn};
use crate::metrics::Collector;

thread_local! {
    static GUARD_DEPTH: Cell<usize> = const { Cell::new(0) };
    static LAST_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// A recovered panic: its payload and the trace of where it was raised.
#[derive(Debug, thiserror::Error)]
#[error("PANIC [{value}] TRACE[{trace}]")]
pub struct Panic {
    pub value: String,
    pub trace: String,
}

/// Recovers panics from everything it wraps.
pub struct Panics {
    collector: Arc<dyn Collector>,
}

impl Panics {
    pub fn new(collector: Arc<dyn Collector>) -> Self {
        install_hook();
        Self { collector }
    }
}

impl Middleware for Panics {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let collector = Arc::clone(&self.collector);
        handler_fn(move |cx, req| {
            let next = Arc::clone(&next);
            let collector = Arc::clone(&collector);
            Box::pin(async move {
                // The call itself happens inside the guarded poll, so a panic
                // while building the inner future is caught too.
                let inner: BoxFuture = Box::pin(async move { next.call(cx, req).await });

                match AssertUnwindSafe(Guarded(inner)).catch_unwind().await {
                    Ok(res) => res,
                    Err(payload) => {
                        let panic = Panic {
                            value: payload_text(payload.as_ref()),
                            trace: take_trace(),
                        };
                        collector.increment_panics();
                        Err(Error::Unclassified(Unclassified::from_source(panic)))
                    }
                }
            })
        })
    }
}

/// Marks the current thread as inside a guarded poll for the duration of
/// each `poll` call.
struct Guarded(BoxFuture);

impl Future for Guarded {
    type Output = Result<(), Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<Self::Output> {
        let _scope = GuardScope::enter();
        self.0.as_mut().poll(cx)
    }
}

/// Drop restores the depth on both normal return and unwind.
struct GuardScope;

impl GuardScope {
    fn enter() -> Self {
        GUARD_DEPTH.with(|d| d.set(d.get() + 1));
        Self
    }
}

impl Drop for GuardScope {
    fn drop(&mut self) {
        GUARD_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

fn install_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if GUARD_DEPTH.with(Cell::get) > 0 {
                let trace = Backtrace::force_capture().to_string();
                LAST_TRACE.with(|t| *t.borrow_mut() = Some(trace));
            } else {
                previous(info);
            }
        }));
    });
}

fn take_trace() -> String {
    LAST_TRACE
        .with(|t| t.borrow_mut().take())
        .unwrap_or_else(|| Backtrace::force_capture().to_string())
}

fn payload_text(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
