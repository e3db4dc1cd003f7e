#![forbid(unsafe_code)]

mod atomic;
pub mod progress_store;
pub mod repository;
pub mod save_queue;

pub use progress_store::{LoadReport, LoadStatus, ProgressStore};
pub use repository::{PersistedProgress, PersistedRecord, RecordError, StorageError};
pub use save_queue::{ImmediateSave, SaveQueue, SaveScheduler};
