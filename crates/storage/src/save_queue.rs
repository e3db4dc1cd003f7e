use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::progress_store::ProgressStore;
use crate::repository::StorageError;

/// Seam through which the session engine asks for its progress to be persisted.
pub trait SaveScheduler: Send + Sync {
    /// Request a save without blocking the caller.
    ///
    /// Returns the failure of an earlier save that has not been reported yet.
    fn schedule_save(&self) -> Option<StorageError>;
}

/// Saves synchronously on the calling thread.
#[derive(Debug, Clone)]
pub struct ImmediateSave {
    store: Arc<ProgressStore>,
}

impl ImmediateSave {
    #[must_use]
    pub fn new(store: Arc<ProgressStore>) -> Self {
        Self { store }
    }
}

impl SaveScheduler for ImmediateSave {
    fn schedule_save(&self) -> Option<StorageError> {
        self.store.save().err()
    }
}

//
// ─── SAVE QUEUE ────────────────────────────────────────────────────────────────
//

type Ack = oneshot::Sender<Result<(), StorageError>>;

enum SaveRequest {
    Save,
    Flush(Ack),
    Shutdown(Ack),
}

/// Background saver with at most one save in flight.
///
/// Requests go through a channel of depth 1. A save snapshots the map when it
/// runs, so when the channel is full the pending save already covers the
/// newest state and further requests are dropped (latest wins).
pub struct SaveQueue {
    store: Arc<ProgressStore>,
    tx: mpsc::Sender<SaveRequest>,
    failure: Arc<Mutex<Option<StorageError>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SaveQueue {
    /// Start the save worker on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Worker` when called outside a tokio runtime.
    pub fn spawn(store: Arc<ProgressStore>) -> Result<Self, StorageError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| StorageError::Worker(e.to_string()))?;
        let (tx, rx) = mpsc::channel(1);
        let failure = Arc::new(Mutex::new(None));
        let worker = handle.spawn(run(Arc::clone(&store), rx, Arc::clone(&failure)));
        Ok(Self {
            store,
            tx,
            failure,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Take the most recent background save failure, if any.
    pub fn take_failure(&self) -> Option<StorageError> {
        self.failure.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Wait until everything recorded so far is on disk.
    ///
    /// # Errors
    ///
    /// Returns the error of the final save, or `StorageError::Worker` if the
    /// worker went away mid-request.
    pub async fn flush(&self) -> Result<(), StorageError> {
        let (ack, done) = oneshot::channel();
        if self.tx.send(SaveRequest::Flush(ack)).await.is_err() {
            return self.save_inline();
        }
        done.await
            .map_err(|_| StorageError::Worker("save worker dropped flush".into()))?
    }

    /// Flush and stop the worker. Later `schedule_save` calls save inline.
    ///
    /// # Errors
    ///
    /// Returns the error of the final save.
    pub async fn shutdown(&self) -> Result<(), StorageError> {
        let (ack, done) = oneshot::channel();
        let result = if self.tx.send(SaveRequest::Shutdown(ack)).await.is_err() {
            self.save_inline()
        } else {
            done.await
                .map_err(|_| StorageError::Worker("save worker dropped shutdown".into()))?
        };

        let worker = self.worker.lock().ok().and_then(|mut slot| slot.take());
        if let Some(worker) = worker {
            worker
                .await
                .map_err(|e| StorageError::Worker(e.to_string()))?;
        }
        result
    }

    fn save_inline(&self) -> Result<(), StorageError> {
        debug!("save worker stopped, saving inline");
        self.store.save()
    }
}

impl SaveScheduler for SaveQueue {
    fn schedule_save(&self) -> Option<StorageError> {
        let earlier = self.take_failure();
        match self.tx.try_send(SaveRequest::Save) {
            Ok(()) => earlier,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("save already pending, coalescing");
                earlier
            }
            Err(mpsc::error::TrySendError::Closed(_)) => self.save_inline().err().or(earlier),
        }
    }
}

impl std::fmt::Debug for SaveQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveQueue")
            .field("path", &self.store.path())
            .field("closed", &self.tx.is_closed())
            .finish_non_exhaustive()
    }
}

async fn run(
    store: Arc<ProgressStore>,
    mut rx: mpsc::Receiver<SaveRequest>,
    failure: Arc<Mutex<Option<StorageError>>>,
) {
    while let Some(request) = rx.recv().await {
        let result = save_off_thread(&store).await;
        if result.is_ok() {
            // A newer state is on disk; an older failure no longer applies.
            if let Ok(mut slot) = failure.lock() {
                slot.take();
            }
        }
        match request {
            SaveRequest::Save => {
                if let Err(err) = result {
                    warn!(error = %err, "background save failed");
                    if let Ok(mut slot) = failure.lock() {
                        *slot = Some(err);
                    }
                }
            }
            SaveRequest::Flush(ack) => {
                let _ = ack.send(result);
            }
            SaveRequest::Shutdown(ack) => {
                let _ = ack.send(result);
                break;
            }
        }
    }
    debug!("save worker stopped");
}

async fn save_off_thread(store: &Arc<ProgressStore>) -> Result<(), StorageError> {
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || store.save())
        .await
        .map_err(|e| StorageError::Worker(e.to_string()))?
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
