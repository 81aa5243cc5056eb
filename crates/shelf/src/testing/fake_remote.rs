//! Fake remote record store
//!
//! Behaves like a record service with optimistic locking: every save assigns
//! a fresh change tag, and an update carrying a stale tag is rejected as a
//! conflict. Failures can be scripted per record (sticky) or for the next
//! request as a whole (one-shot).

use async_trait::async_trait;
use chrono::Utc;
use futures::future::BoxFuture;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::PoisonError;
use tokio::sync::Mutex;
use tracing::debug;

use shelf_api::{ItemError, RecordId, RemoteRecord, SystemFields, TransportError, UploadOutcome, Value};

use crate::core::{FieldKey, RemoteStore};

/// Async closure run while an upload request is in flight
pub type InFlightHook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

#[derive(Debug, Clone)]
struct StoredRecord<K> {
    system_fields: SystemFields,
    fields: BTreeMap<K, Value>,
}

struct FakeState<K> {
    records: HashMap<RecordId, StoredRecord<K>>,
    item_failures: HashMap<RecordId, ItemError>,
    next_total_failure: Option<TransportError>,
    uploads: Vec<Vec<RecordId>>,
}

pub struct FakeRemote<K: FieldKey> {
    state: Mutex<FakeState<K>>,
    in_flight: std::sync::Mutex<Option<InFlightHook>>,
    tag_counter: AtomicU64,
}

impl<K: FieldKey> FakeRemote<K> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                records: HashMap::new(),
                item_failures: HashMap::new(),
                next_total_failure: None,
                uploads: Vec::new(),
            }),
            in_flight: std::sync::Mutex::new(None),
            tag_counter: AtomicU64::new(0),
        }
    }

    fn next_system_fields(&self) -> SystemFields {
        let tag = self.tag_counter.fetch_add(1, Ordering::SeqCst) + 1;
        SystemFields::new(format!("tag-{}", tag), Utc::now())
    }

    /// Put a record on the server directly, as if saved by another device.
    ///
    /// Returns the system fields the local entity should hold to be in sync.
    pub async fn seed(&self, record: &RemoteRecord<K>) -> SystemFields {
        let system_fields = self.next_system_fields();
        self.state.lock().await.records.insert(
            record.id().clone(),
            StoredRecord {
                system_fields: system_fields.clone(),
                fields: record.fields().map(|(k, v)| (*k, v.clone())).collect(),
            },
        );
        system_fields
    }

    /// Fail every upload of this record until cleared
    pub async fn fail_record(&self, id: &RecordId, error: ItemError) {
        self.state
            .lock()
            .await
            .item_failures
            .insert(id.clone(), error);
    }

    pub async fn clear_failures(&self) {
        self.state.lock().await.item_failures.clear();
    }

    /// Fail the next upload request as a whole
    pub async fn fail_next_upload(&self, error: TransportError) {
        self.state.lock().await.next_total_failure = Some(error);
    }

    /// Run `hook` while the next upload request is suspended
    pub fn during_next_upload<F, Fut>(&self, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let hook: InFlightHook = Box::new(move || Box::pin(hook()));
        *self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(hook);
    }

    /// Ids of every upload request, in order
    pub async fn uploads(&self) -> Vec<Vec<RecordId>> {
        self.state.lock().await.uploads.clone()
    }

    /// Server copy of a record
    pub async fn record(&self, id: &RecordId) -> Option<RemoteRecord<K>> {
        let state = self.state.lock().await;
        let stored = state.records.get(id)?;
        let mut record = RemoteRecord::new(id.clone(), Some(stored.system_fields.clone()));
        for (key, value) in &stored.fields {
            record.set(*key, value.clone());
        }
        Some(record)
    }

    fn take_in_flight_hook(&self) -> Option<InFlightHook> {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn check_change_tag(
        stored: Option<&StoredRecord<K>>,
        record: &RemoteRecord<K>,
    ) -> Result<(), ItemError> {
        match (stored, record.system_fields()) {
            (None, None) => Ok(()),
            (None, Some(_)) => Err(ItemError::unknown(format!(
                "record {} does not exist on the server",
                record.id()
            ))),
            (Some(stored), Some(sent)) if sent.change_tag == stored.system_fields.change_tag => {
                Ok(())
            }
            (Some(stored), sent) => Err(ItemError::conflict(format!(
                "server has {}, upload carried {}",
                stored.system_fields.change_tag,
                sent.map(|s| s.change_tag.as_str()).unwrap_or("no tag")
            ))),
        }
    }
}

impl<K: FieldKey> Default for FakeRemote<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K: FieldKey> RemoteStore<K> for FakeRemote<K> {
    async fn upload(&self, records: &[RemoteRecord<K>]) -> UploadOutcome {
        self.state
            .lock()
            .await
            .uploads
            .push(records.iter().map(|r| r.id().clone()).collect());

        if let Some(hook) = self.take_in_flight_hook() {
            debug!("[FakeRemote] Running in-flight hook");
            hook().await;
        }

        let mut state = self.state.lock().await;
        if let Some(error) = state.next_total_failure.take() {
            debug!("[FakeRemote] Failing upload of {} records: {}", records.len(), error);
            return UploadOutcome::TotalFailure(error);
        }

        let mut saved = HashMap::new();
        let mut failed = HashMap::new();
        for record in records {
            let id = record.id();
            if let Some(error) = state.item_failures.get(id) {
                failed.insert(id.clone(), error.clone());
                continue;
            }
            if let Err(error) = Self::check_change_tag(state.records.get(id), record) {
                failed.insert(id.clone(), error);
                continue;
            }

            let system_fields = self.next_system_fields();
            state.records.insert(
                id.clone(),
                StoredRecord {
                    system_fields: system_fields.clone(),
                    fields: record.fields().map(|(k, v)| (*k, v.clone())).collect(),
                },
            );
            saved.insert(id.clone(), system_fields);
        }

        debug!(
            "[FakeRemote] Saved {}, failed {} of {} records",
            saved.len(),
            failed.len(),
            records.len()
        );
        UploadOutcome::from_results(saved, failed)
    }
}
