//! Shutdown and fatal-error signalling shared by every bridge task.
//!
//! A bridge runs several long-lived tasks (poll loop, command listener,
//! event listener, transport driver). They all observe one [`Shutdown`]
//! signal, and any of them can report an unrecoverable condition through a
//! [`FatalSender`]. The runner owns both ends and turns a fatal report into
//! an orderly shutdown.

use tokio::sync::{mpsc, watch};

use crate::error::BridgeError;

/// Create a shutdown trigger and its first observer.
pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

/// Create the fatal-error channel.
pub fn fatal_channel() -> (FatalSender, FatalReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (FatalSender { tx }, FatalReceiver { rx })
}

/// Owner side of the shutdown signal.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Signal every observer to stop.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Create another observer.
    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

/// Cloneable observer of the shutdown signal.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Whether shutdown has already been signalled.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is signalled.
    ///
    /// Also resolves when the trigger was dropped, so orphaned tasks stop too.
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

/// Reports unrecoverable errors to the runner.
#[derive(Debug, Clone)]
pub struct FatalSender {
    tx: mpsc::UnboundedSender<BridgeError>,
}

impl FatalSender {
    /// Report a fatal error. Only the first report is acted upon.
    pub fn raise(&self, error: BridgeError) {
        tracing::error!(error = %error, "Fatal bridge error");
        // The runner may already be shutting down and have dropped the receiver.
        let _ = self.tx.send(error);
    }
}

/// Runner side of the fatal-error channel.
#[derive(Debug)]
pub struct FatalReceiver {
    rx: mpsc::UnboundedReceiver<BridgeError>,
}

impl FatalReceiver {
    /// Wait for the first fatal error.
    ///
    /// Pends forever once every sender is gone, so it can sit in a `select!`
    /// next to the signal handlers.
    pub async fn recv(&mut self) -> BridgeError {
        match self.rx.recv().await {
            Some(err) => err,
            None => std::future::pending().await,
        }
    }
}
