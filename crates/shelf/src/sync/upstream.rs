//! Upstream reconciliation of locally edited entities
//!
//! One pass takes a snapshot of every entity in the batch, uploads the full
//! records in a single request and then, back on the store's context,
//! clears only those pending keys whose current local value still equals the
//! value that was sent. Keys edited while the upload was in flight stay
//! pending for the next pass.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use shelf_api::{ItemError, RecordId, RemoteRecord, SystemFields, UploadOutcome};

use crate::config::SyncConfig;
use crate::core::{LocalStore, RemoteStore, SyncEntity};
use crate::error::Result;
use crate::sync::item_errors::{ItemErrorHandler, LogItemErrors};
use crate::sync::report::ReconcileReport;

pub struct UpstreamReconciler<E, S, R> {
    name: String,
    store: Arc<S>,
    remote: Arc<R>,
    item_errors: Arc<dyn ItemErrorHandler>,
    config: SyncConfig,
    pass_lock: Mutex<()>,
    _entity: PhantomData<fn() -> E>,
}

impl<E, S, R> UpstreamReconciler<E, S, R>
where
    E: SyncEntity,
    S: LocalStore<E>,
    R: RemoteStore<E::Key>,
{
    pub fn new(store: Arc<S>, remote: Arc<R>, config: SyncConfig) -> Self {
        Self {
            name: "UpstreamReconciler".to_string(),
            store,
            remote,
            item_errors: Arc::new(LogItemErrors),
            config,
            pass_lock: Mutex::new(()),
            _entity: PhantomData,
        }
    }

    /// Name used as the log prefix
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_item_error_handler(mut self, handler: Arc<dyn ItemErrorHandler>) -> Self {
        self.item_errors = handler;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    /// Push one batch of entities and reconcile the outcome locally.
    ///
    /// Every entity is expected to have at least one pending key; the batch
    /// is not filtered again. Two passes over overlapping entities must not
    /// run at the same time: a later pass could upload a snapshot older than
    /// the one an earlier pass just confirmed. `push_pending` serializes its
    /// own passes.
    ///
    /// Returns `SyncError::Transport` when the upload failed as a whole and
    /// `SyncError::Storage` when the local commit failed. In both cases no
    /// local state was changed.
    #[tracing::instrument(
        name = "sync.upstream.reconcile",
        skip(self, entities),
        fields(reconciler = %self.name, batch = entities.len())
    )]
    pub async fn reconcile(&self, entities: Vec<E>) -> Result<ReconcileReport> {
        if entities.is_empty() {
            debug!("[{}] Empty batch, nothing to upload", self.name);
            return Ok(ReconcileReport::default());
        }

        let (records, deltas): (Vec<RemoteRecord<E::Key>>, Vec<Vec<E::Key>>) = entities
            .iter()
            .map(|entity| {
                (
                    entity.remote_record_for_update(),
                    entity.pending_remote_update_keys().to_vec(),
                )
            })
            .unzip();
        drop(entities);

        info!("[{}] Uploading {} records", self.name, records.len());
        let (saved, failed) = match self.remote.upload(&records).await {
            UploadOutcome::AllSucceeded { saved } => (saved, HashMap::new()),
            UploadOutcome::PartialFailure { saved, failed } => {
                warn!(
                    "[{}] Partial failure: {} of {} records failed",
                    self.name,
                    failed.len(),
                    records.len()
                );
                (saved, failed)
            }
            UploadOutcome::TotalFailure(error) => {
                warn!("[{}] Upload failed, nothing reconciled: {}", self.name, error);
                return Err(error.into());
            }
        };

        let report = self
            .store
            .perform(|tx| {
                let mut report = ReconcileReport::for_batch(records.len());
                for (record, delta) in records.iter().zip(&deltas) {
                    let id = record.id();

                    if tx.entity(id).is_none() {
                        debug!("[{}] {} was deleted during upload, skipping", self.name, id);
                        report.skipped_deleted += 1;
                        continue;
                    }

                    if let Some(error) = failed.get(id) {
                        self.report_item_error(&mut report, id, error.clone());
                        continue;
                    }

                    let Some(system_fields) = saved.get(id) else {
                        let error = ItemError::unknown("record was neither saved nor rejected");
                        self.report_item_error(&mut report, id, error);
                        continue;
                    };

                    let Some(entity) = tx.entity_mut(id) else {
                        continue;
                    };
                    self.settle(entity, record, delta, system_fields, &mut report);
                }
                report
            })
            .await?;

        info!(
            "[{}] Pass done: {} succeeded, {} failed, {} keys cleared, {} left pending, {} deleted",
            self.name,
            report.succeeded,
            report.failures.len(),
            report.cleared_keys,
            report.still_pending.len(),
            report.skipped_deleted
        );
        Ok(report)
    }

    /// Upload everything the store reports as pending, in passes of at most
    /// `max_batch_size` entities.
    ///
    /// Only the pending ids are taken up front. Each pass re-reads its
    /// entities from the store right before uploading, so edits and deletes
    /// made during an earlier pass are seen by the later ones. Entities
    /// deleted in the meantime are counted as `skipped_deleted`.
    ///
    /// A transport or storage failure stops the run; passes committed before
    /// it stay committed.
    #[tracing::instrument(name = "sync.upstream.push_pending", skip(self), fields(reconciler = %self.name))]
    pub async fn push_pending(&self) -> Result<ReconcileReport> {
        let _pass = self.pass_lock.lock().await;

        let pending: Vec<RecordId> = self
            .store
            .fetch_pending()
            .await?
            .iter()
            .map(|entity| entity.record_id().clone())
            .collect();
        if pending.is_empty() {
            debug!("[{}] No pending entities", self.name);
            return Ok(ReconcileReport::default());
        }

        let batch_size = self.config.max_batch_size.max(1);
        info!(
            "[{}] {} pending entities, batch size {}",
            self.name,
            pending.len(),
            batch_size
        );

        let mut total = ReconcileReport::default();
        for ids in pending.chunks(batch_size) {
            let present = self.store.fetch(ids).await?;
            let deleted = ids.len() - present.len();
            if deleted > 0 {
                debug!("[{}] {} entities deleted before their pass", self.name, deleted);
                total.skipped_deleted += deleted;
            }

            let batch: Vec<E> = present
                .into_iter()
                .filter(|entity| entity.has_pending_remote_updates())
                .collect();
            let report = self.reconcile(batch).await?;
            total.merge(report);
        }
        Ok(total)
    }

    fn report_item_error(&self, report: &mut ReconcileReport, id: &RecordId, error: ItemError) {
        self.item_errors.handle_item_error(id, &error);
        report.record_failure(id, error);
    }

    /// Apply a confirmed save to the live entity
    fn settle(
        &self,
        entity: &mut E,
        sent: &RemoteRecord<E::Key>,
        delta: &[E::Key],
        system_fields: &SystemFields,
        report: &mut ReconcileReport,
    ) {
        entity.store_system_fields(system_fields.clone());

        let (confirmed, raced): (Vec<E::Key>, Vec<E::Key>) =
            delta.iter().copied().partition(|key| {
                sent.get(key).is_some_and(|sent_value| {
                    self.remote
                        .values_are_equal(sent_value, &entity.field_value(*key))
                })
            });

        if !raced.is_empty() {
            debug!(
                "[{}] {} changed during upload, keeping {:?} pending",
                self.name,
                sent.id(),
                raced
            );
        }
        entity.remove_pending_remote_update_keys(&confirmed);
        report.record_success(sent.id(), confirmed.len(), &raced);
    }
}
