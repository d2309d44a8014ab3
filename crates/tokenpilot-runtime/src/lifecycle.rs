//! Process lifecycle.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokenpilot_core::storage::{IdentityStore, StorageError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Why the process is stopping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// Ctrl-C / SIGINT
    Interrupt,
    /// SIGTERM
    Terminate,
    /// The dispatcher returned on its own
    Finished,
}

impl fmt::Display for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Finished => "finished",
        })
    }
}

/// Owns the shutdown token and the shared storage handle.
pub struct Lifecycle {
    store: Arc<dyn IdentityStore>,
    shutdown: CancellationToken,
    stopped: AtomicBool,
}

impl Lifecycle {
    /// Create a lifecycle around `store`
    #[must_use]
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self {
            store,
            shutdown: CancellationToken::new(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Token cancelled by [`Lifecycle::stop`]
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Whether `stop` has run
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Verify storage before accepting updates.
    ///
    /// # Errors
    ///
    /// Returns the storage error; the store is released before returning.
    pub async fn start(&self) -> Result<(), StorageError> {
        if let Err(err) = self.store.check_connection().await {
            error!(error = %err, "Storage is unreachable, aborting launch");
            self.store.close().await;
            return Err(err);
        }
        info!("Storage connection verified");
        Ok(())
    }

    /// Cancel the shutdown token and release storage. Later calls do nothing.
    pub async fn stop(&self, signal: StopSignal) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(%signal, "Shutting down");
        self.shutdown.cancel();
        self.store.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokenpilot_core::storage::SqliteStore;

    fn store() -> SqliteStore {
        match SqliteStore::open_in_memory() {
            Ok(store) => store,
            Err(err) => panic!("in-memory store failed: {err}"),
        }
    }

    #[tokio::test]
    async fn start_succeeds_on_open_store() {
        let lifecycle = Lifecycle::new(Arc::new(store()));
        assert!(lifecycle.start().await.is_ok());
        assert!(!lifecycle.token().is_cancelled());
    }

    #[tokio::test]
    async fn start_fails_on_closed_store() {
        let store = store();
        store.close().await;
        let lifecycle = Lifecycle::new(Arc::new(store));
        assert!(matches!(lifecycle.start().await, Err(StorageError::Closed)));
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_releases_store() {
        let store = store();
        let lifecycle = Lifecycle::new(Arc::new(store.clone()));
        let token = lifecycle.token();

        lifecycle.stop(StopSignal::Interrupt).await;
        lifecycle.stop(StopSignal::Terminate).await;

        assert!(token.is_cancelled());
        assert!(lifecycle.is_stopped());
        assert!(matches!(
            store.check_connection().await,
            Err(StorageError::Closed)
        ));
    }
}
