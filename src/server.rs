//! HTTP server and graceful shutdown.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//! A handler can also ask for a shutdown by returning a shutdown error.
//! Both arrive on the same [`shutdown`](crate::shutdown) channel.
//!
//! The server reacts by:
//! 1. Immediately stopping `listener.accept()`, so no new connections are made.
//! 2. Telling every open connection to finish. Idle keep-alive connections
//!    close at once; a connection with a request in flight answers it with
//!    keep-alive disabled, then closes.
//! 3. Aborting whatever is still running once the drain timeout expires.
//! 4. Returning from [`Server::serve`], which lets `main` exit cleanly.
//!
//! Keep the drain timeout below `terminationGracePeriodSeconds`.
//!
//! # Connection limits
//!
//! | Limit | Default | On expiry |
//! |---|---|---|
//! | read timeout | 5 s | headers: connection closed; body: `408` |
//! | write timeout | 10 s | handler dropped, `503` |
//! | idle timeout | 120 s | keep-alive connection closed |
//! | max body | 1 MiB | `413` |

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::ServeError;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;
use crate::shutdown::Listener;

const DEFAULT_DRAIN: Duration = Duration::from_secs(20);

const SERVICE_UNAVAILABLE_BODY: &str = r#"{"error":"Service Unavailable"}"#;

/// Per-connection limits, copied into every connection task.
#[derive(Clone, Copy, Debug)]
struct Limits {
    read: Duration,
    write: Duration,
    idle: Duration,
    max_body: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            read: Duration::from_secs(5),
            write: Duration::from_secs(10),
            idle: Duration::from_secs(120),
            max_body: 1 << 20,
        }
    }
}

enum Bind {
    Addr(SocketAddr),
    Listener(std::net::TcpListener),
}

/// The HTTP server.
pub struct Server {
    bind: Bind,
    drain: Duration,
    limits: Limits,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// ```rust
    /// use ward::Server;
    /// let server = Server::bind("0.0.0.0:3000").unwrap();
    /// ```
    pub fn bind(addr: &str) -> Result<Self, ServeError> {
        let addr = addr
            .parse()
            .map_err(|source| ServeError::Addr { addr: addr.to_owned(), source })?;
        Ok(Self::with_bind(Bind::Addr(addr)))
    }

    /// Serves on an already bound listener, e.g. one bound to port 0.
    pub fn from_listener(listener: std::net::TcpListener) -> Self {
        Self::with_bind(Bind::Listener(listener))
    }

    fn with_bind(bind: Bind) -> Self {
        Self { bind, drain: DEFAULT_DRAIN, limits: Limits::default() }
    }

    /// Upper bound on how long in-flight connections may run after shutdown
    /// starts.
    pub fn drain_timeout(mut self, drain: Duration) -> Self {
        self.drain = drain;
        self
    }

    /// Time allowed to receive request headers, and separately the body.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.limits.read = timeout;
        self
    }

    /// Time allowed for the handler chain to produce a response.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.limits.write = timeout;
        self
    }

    /// How long a keep-alive connection may sit without a request.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.limits.idle = timeout;
        self
    }

    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.limits.max_body = limit;
        self
    }

    /// Starts accepting connections and dispatching them through `router`.
    ///
    /// Returns after the first shutdown signal on `shutdown` and a bounded
    /// drain of in-flight connections.
    pub async fn serve(self, router: Router, mut shutdown: Listener) -> Result<(), ServeError> {
        let listener = match self.bind {
            Bind::Addr(addr) => TcpListener::bind(addr).await?,
            Bind::Listener(std) => {
                std.set_nonblocking(true)?;
                TcpListener::from_std(std)?
            }
        };
        let addr = listener.local_addr()?;
        let limits = self.limits;

        // Shared across connection tasks without copying the routing table.
        let router = Arc::new(router);

        let mut builder = ConnBuilder::new(TokioExecutor::new());
        builder.http1().timer(TokioTimer::new()).header_read_timeout(limits.read);
        let builder = Arc::new(builder);

        // Flipped once; every connection task watches it.
        let (draining, _) = watch::channel(false);

        info!(%addr, "ward listening");

        // Tracks every spawned connection task so we can wait for them
        // during graceful shutdown.
        let mut tasks = tokio::task::JoinSet::new();

        loop {
            tokio::select! {
                // Check shutdown first so a signal immediately stops
                // accepting new connections, even if more are queued.
                biased;

                signal = shutdown.recv() => {
                    match signal {
                        Some(signal) => info!(%signal, in_flight = tasks.len(), "shutdown started, draining connections"),
                        None => warn!(in_flight = tasks.len(), "shutdown channel closed, draining connections"),
                    }
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    tasks.spawn(connection(
                        Arc::clone(&builder),
                        stream,
                        remote_addr,
                        Arc::clone(&router),
                        limits,
                        draining.subscribe(),
                    ));
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        drop(listener);
        draining.send_replace(true);

        let drained = tokio::time::timeout(self.drain, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(remaining = tasks.len(), timeout = ?self.drain, "drain timed out, aborting connections");
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        info!("ward stopped");
        Ok(())
    }
}

// ── Connections ───────────────────────────────────────────────────────────────

/// Drives one connection until the peer closes it, it goes idle, or the
/// server starts draining. The last two ask hyper to finish gracefully.
async fn connection(
    builder: Arc<ConnBuilder<TokioExecutor>>,
    stream: TcpStream,
    remote_addr: SocketAddr,
    router: Arc<Router>,
    limits: Limits,
    mut draining: watch::Receiver<bool>,
) {
    let activity = Arc::new(Activity::new());

    let svc = {
        let activity = Arc::clone(&activity);
        // Called once per request on the connection.
        service_fn(move |req| {
            let router = Arc::clone(&router);
            let busy = Activity::begin(&activity);
            async move {
                let _busy = busy;
                dispatch(router, req, remote_addr, limits).await
            }
        })
    };

    let conn = builder.serve_connection(TokioIo::new(stream), svc);
    tokio::pin!(conn);

    let mut closing = false;
    loop {
        tokio::select! {
            res = conn.as_mut() => {
                if let Err(e) = res {
                    debug!(peer = %remote_addr, "connection error: {e}");
                }
                break;
            }

            // The flag only ever flips to true. A closed channel means the
            // server is gone, which is also a reason to finish.
            _ = draining.changed(), if !closing => {
                closing = true;
                conn.as_mut().graceful_shutdown();
            }

            () = activity.idle_for(limits.idle), if !closing => {
                debug!(peer = %remote_addr, timeout = ?limits.idle, "closing idle connection");
                closing = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}

/// Request activity on one connection, for the idle timeout.
struct Activity {
    epoch: Instant,
    in_flight: AtomicUsize,
    /// Milliseconds after `epoch` of the last request start or finish.
    last: AtomicU64,
}

/// Marks a request in flight until dropped.
struct Busy(Arc<Activity>);

impl Activity {
    fn new() -> Self {
        Self { epoch: Instant::now(), in_flight: AtomicUsize::new(0), last: AtomicU64::new(0) }
    }

    fn begin(this: &Arc<Self>) -> Busy {
        this.in_flight.fetch_add(1, Ordering::AcqRel);
        this.touch();
        Busy(Arc::clone(this))
    }

    fn touch(&self) {
        let now = u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.last.store(now, Ordering::Release);
    }

    /// Resolves once no request has been in flight for `timeout`.
    async fn idle_for(&self, timeout: Duration) {
        loop {
            let wait = if self.in_flight.load(Ordering::Acquire) > 0 {
                timeout
            } else {
                let last = Duration::from_millis(self.last.load(Ordering::Acquire));
                let quiet = self.epoch.elapsed().saturating_sub(last);
                match timeout.checked_sub(quiet) {
                    Some(left) if !left.is_zero() => left,
                    _ => return,
                }
            };
            tokio::time::sleep(wait).await;
        }
    }
}

impl Drop for Busy {
    fn drop(&mut self) {
        self.0.touch();
        self.0.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Adapts one hyper request to the router and back.
///
/// The error type is [`Infallible`]: every failure becomes a response, so
/// hyper never sees an error.
async fn dispatch(
    router: Arc<Router>,
    req: hyper::Request<hyper::body::Incoming>,
    remote_addr: SocketAddr,
    limits: Limits,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();

    let body = Limited::new(body, limits.max_body);
    let body = match tokio::time::timeout(limits.read, body.collect()).await {
        Ok(Ok(collected)) => collected.to_bytes(),
        Ok(Err(e)) if e.is::<LengthLimitError>() => {
            warn!(peer = %remote_addr, limit = limits.max_body, "request body too large");
            return Ok(Response::status(StatusCode::PAYLOAD_TOO_LARGE).into_inner());
        }
        Ok(Err(e)) => {
            warn!(peer = %remote_addr, "failed to read request body: {e}");
            return Ok(Response::status(StatusCode::BAD_REQUEST).into_inner());
        }
        Err(_) => {
            warn!(peer = %remote_addr, timeout = ?limits.read, "timed out reading request body");
            return Ok(Response::status(StatusCode::REQUEST_TIMEOUT).into_inner());
        }
    };

    let mut req = Request::from(http::Request::from_parts(parts, body));
    req.set_remote_addr(remote_addr);

    match tokio::time::timeout(limits.write, router.dispatch(req)).await {
        Ok(res) => Ok(res.into_inner()),
        Err(_) => {
            warn!(peer = %remote_addr, timeout = ?limits.write, "handler timed out");
            let res = Response::json_bytes(StatusCode::SERVICE_UNAVAILABLE, SERVICE_UNAVAILABLE_BODY);
            Ok(res.into_inner())
        }
    }
}
