use serde::{Deserialize, Serialize};

use shelf_api::{ItemError, RecordId};

use crate::core::FieldKey;

/// Outcome of one or more reconciliation passes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub uploaded: usize,
    pub succeeded: usize,
    pub cleared_keys: usize,
    pub skipped_deleted: usize,
    pub still_pending: Vec<PendingInfo>,
    pub failures: Vec<FailureInfo>,
}

/// Fields of a saved record that changed again while the upload was in flight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingInfo {
    pub record_id: RecordId,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub record_id: RecordId,
    pub error: ItemError,
}

impl ReconcileReport {
    pub(crate) fn for_batch(uploaded: usize) -> Self {
        Self {
            uploaded,
            ..Self::default()
        }
    }

    pub(crate) fn record_success<K: FieldKey>(
        &mut self,
        record_id: &RecordId,
        cleared: usize,
        still_pending: &[K],
    ) {
        self.succeeded += 1;
        self.cleared_keys += cleared;
        if !still_pending.is_empty() {
            self.still_pending.push(PendingInfo {
                record_id: record_id.clone(),
                fields: still_pending
                    .iter()
                    .map(|key| key.remote_name().to_string())
                    .collect(),
            });
        }
    }

    pub(crate) fn record_failure(&mut self, record_id: &RecordId, error: ItemError) {
        self.failures.push(FailureInfo {
            record_id: record_id.clone(),
            error,
        });
    }

    /// Fold the report of a later pass into this one
    pub fn merge(&mut self, other: ReconcileReport) {
        self.uploaded += other.uploaded;
        self.succeeded += other.succeeded;
        self.cleared_keys += other.cleared_keys;
        self.skipped_deleted += other.skipped_deleted;
        self.still_pending.extend(other.still_pending);
        self.failures.extend(other.failures);
    }

    /// True when nothing is left to upload for the entities of this report
    pub fn is_settled(&self) -> bool {
        self.still_pending.is_empty() && self.failures.is_empty()
    }

    pub fn failed_ids(&self) -> Vec<&RecordId> {
        self.failures.iter().map(|f| &f.record_id).collect()
    }
}
