use shelf_api::RecordId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Entity not found: {id}")]
    NotFound { id: RecordId },

    #[error("Commit failed: {0}")]
    CommitFailed(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;
