//! Upstream processor for edited books

use std::sync::Arc;

use tracing::debug;

use shelf::core::{LocalStore, RemoteStore, SyncEntity};
use shelf::sync::{ItemErrorHandler, ReconcileReport, UpstreamReconciler};
use shelf::{Result, SyncConfig};

use crate::models::{Book, BookKey};

/// Pushes field edits of already synced books to the remote store.
///
/// Inserts and deletions are handled by their own processors; this one only
/// sends books matching [`BookUpdater::has_pending_remote_updates`].
pub struct BookUpdater<S, R> {
    reconciler: UpstreamReconciler<Book, S, R>,
}

impl<S, R> BookUpdater<S, R>
where
    S: LocalStore<Book>,
    R: RemoteStore<BookKey>,
{
    pub fn new(store: Arc<S>, remote: Arc<R>, config: SyncConfig) -> Self {
        Self {
            reconciler: UpstreamReconciler::new(store, remote, config).with_name("BookUpdater"),
        }
    }

    pub fn with_item_error_handler(mut self, handler: Arc<dyn ItemErrorHandler>) -> Self {
        self.reconciler = self.reconciler.with_item_error_handler(handler);
        self
    }

    pub fn debug_description(&self) -> &str {
        self.reconciler.name()
    }

    /// Books the local store should hand to this processor. This is the
    /// `SyncEntity` predicate that `LocalStore::fetch_pending` filters on.
    pub fn has_pending_remote_updates(book: &Book) -> bool {
        SyncEntity::has_pending_remote_updates(book)
    }

    /// Upload one batch of edited books and reconcile the result
    pub async fn process_local_changes(&self, books: Vec<Book>) -> Result<ReconcileReport> {
        debug!(
            "[{}] Processing {} edited books",
            self.debug_description(),
            books.len()
        );
        self.reconciler.reconcile(books).await
    }

    /// Upload every book the store reports as pending
    pub async fn push_pending(&self) -> Result<ReconcileReport> {
        self.reconciler.push_pending().await
    }
}
