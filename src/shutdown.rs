//! Process shutdown signalling.
//!
//! One bounded channel (capacity 1) carries every reason to stop: an OS
//! signal, or a handler reporting that service integrity is compromised.
//! The [`Server`](crate::Server) loop owns the receiving end.
//!
//! Sending never blocks. If a signal is already pending the new one is
//! dropped, since the process is going down either way.

use std::fmt;

use tokio::sync::mpsc;
use tracing::{error, warn};

/// Why the process is stopping.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Signal {
    /// SIGINT / Ctrl-C.
    Interrupt,
    /// SIGTERM, as sent by Kubernetes.
    Terminate,
    /// A request reported a shutdown error.
    Integrity(String),
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => f.write_str("SIGINT"),
            Self::Terminate => f.write_str("SIGTERM"),
            Self::Integrity(reason) => write!(f, "integrity: {reason}"),
        }
    }
}

/// Sending half. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Shutdown {
    tx: mpsc::Sender<Signal>,
}

/// Receiving half, held by the serve loop.
#[derive(Debug)]
pub struct Listener {
    rx: mpsc::Receiver<Signal>,
}

/// Creates the process-wide shutdown channel.
pub fn channel() -> (Shutdown, Listener) {
    let (tx, rx) = mpsc::channel(1);
    (Shutdown { tx }, Listener { rx })
}

impl Shutdown {
    /// Requests shutdown. Returns `false` when a signal was already pending
    /// or the listener is gone.
    pub fn signal(&self, signal: Signal) -> bool {
        match self.tx.try_send(signal) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(signal = %dropped, "shutdown already pending");
                false
            }
            Err(mpsc::error::TrySendError::Closed(dropped)) => {
                warn!(signal = %dropped, "shutdown listener closed");
                false
            }
        }
    }
}

impl Listener {
    /// Resolves with the first signal. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<Signal> {
        self.rx.recv().await
    }

    /// Non-blocking check, mainly for tests.
    pub fn try_recv(&mut self) -> Option<Signal> {
        self.rx.try_recv().ok()
    }
}

/// Forwards SIGINT and SIGTERM into `shutdown` until the first one arrives.
///
/// On Windows only Ctrl-C is available.
pub async fn forward_os_signals(shutdown: Shutdown) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    // `pending()` never resolves, so on non-Unix the SIGTERM arm is disabled.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    let signal = tokio::select! {
        () = ctrl_c  => Signal::Interrupt,
        () = sigterm => Signal::Terminate,
    };
    shutdown.signal(signal);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_signal_is_dropped_while_one_is_pending() {
        let (tx, mut rx) = channel();
        assert!(tx.signal(Signal::Integrity("first".into())));
        assert!(!tx.signal(Signal::Terminate));
        assert_eq!(rx.recv().await, Some(Signal::Integrity("first".into())));
        assert_eq!(rx.try_recv(), None);
    }
}
