//! Errors surfaced by a reconciliation pass

use shelf_api::TransportError;
use thiserror::Error;

use crate::storage::types::StorageError;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The upload request failed as a whole; no local state was touched
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl SyncError {
    pub fn is_transport(&self) -> bool {
        matches!(self, SyncError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
