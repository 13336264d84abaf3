//! Cooperative shutdown signalling.
//!
//! Long-running activities (tracker loop, seeder accept loop, download
//! workers) hold a [`Shutdown`] and observe it with `select!` at every
//! suspension point. The owning side keeps the [`ShutdownHandle`] and fires
//! it once; the signal is sticky and fans out to every clone.

use tokio::sync::watch;

/// Sending side of the shutdown signal.
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Signals every [`Shutdown`] clone. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Receiving side of the shutdown signal. Cheap to clone; one clone per
/// activity.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Creates a connected handle/receiver pair.
    pub fn new() -> (ShutdownHandle, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (ShutdownHandle { tx }, Shutdown { rx })
    }

    /// Returns `true` once the handle has fired.
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when the handle fires. If the handle is dropped without
    /// firing, the signal can never arrive and this pends forever.
    pub async fn recv(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        while self.rx.changed().await.is_ok() {
            if *self.rx.borrow() {
                return;
            }
        }
        std::future::pending::<()>().await;
    }
}
