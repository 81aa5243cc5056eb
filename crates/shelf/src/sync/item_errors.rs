//! Hook receiving per-record upload failures

use shelf_api::{ItemError, RecordId};
use tracing::warn;

/// Receives every item failure of a partially failed upload.
///
/// Fields of the failed record stay pending whatever the hook does; the raw
/// error kind is passed through so retry policy can live above the core.
pub trait ItemErrorHandler: Send + Sync {
    fn handle_item_error(&self, record_id: &RecordId, error: &ItemError);
}

/// Default handler: log and move on
#[derive(Debug, Clone, Copy, Default)]
pub struct LogItemErrors;

impl ItemErrorHandler for LogItemErrors {
    fn handle_item_error(&self, record_id: &RecordId, error: &ItemError) {
        warn!("[ItemErrors] Record {} errored: {}", record_id, error);
    }
}

impl<F> ItemErrorHandler for F
where
    F: Fn(&RecordId, &ItemError) + Send + Sync,
{
    fn handle_item_error(&self, record_id: &RecordId, error: &ItemError) {
        self(record_id, error)
    }
}
