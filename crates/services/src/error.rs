//! Shared error types for the services crate.

use std::path::PathBuf;

use thiserror::Error;

use recall_core::model::{CardId, SessionSummaryError};
use storage::StorageError;

/// Errors emitted by card sources.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SourceError {
    #[error("cannot read card directory {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("discovery worker failed: {0}")]
    Worker(String),
}

/// Errors emitted by session services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("card {0} is queued but missing from the progress store")]
    UnknownCard(CardId),
    #[error(transparent)]
    Summary(#[from] SessionSummaryError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
