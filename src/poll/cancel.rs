//! Cooperative cancellation for convergence waits.

use std::future;

use tokio::sync::watch;

/// Creates a linked cancellation handle and signal.
///
/// The signal may be cloned and handed to any number of waits; calling
/// [`CancelHandle::cancel`] wakes all of them.
#[must_use]
pub fn cancellation() -> (CancelHandle, Cancellation) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, Cancellation { rx })
}

/// Owner side of a cancellation signal.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Requests cancellation of every wait observing the linked signal.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observer side of a cancellation signal.
#[derive(Clone, Debug)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

impl Cancellation {
    /// Returns a signal that never fires.
    #[must_use]
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Returns `true` once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation has been requested.
    ///
    /// If the handle is dropped without cancelling, the future never resolves.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                future::pending::<()>().await;
            }
        }
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::never()
    }
}
