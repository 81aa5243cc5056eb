//! Core sync traits
//!
//! The reconciler is written against three capabilities:
//! - `SyncEntity`: a locally-owned record with per-field dirty tracking
//! - `LocalStore`: the store owning those entities, with a serial,
//!   transactional execution context
//! - `RemoteStore`: the remote record store receiving batched upserts

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::hash::Hash;

use shelf_api::{RecordId, RemoteRecord, SystemFields, UploadOutcome, Value};

use crate::storage::types::StorageError;

/// Closed enumeration of the synced fields of one entity type.
///
/// Implemented by a fieldless enum so that adding a field to the record
/// schema is caught by exhaustive matches.
pub trait FieldKey: Copy + Eq + Ord + Hash + Debug + Send + Sync + 'static {
    /// Every key of the schema, in declaration order
    const ALL: &'static [Self];

    /// Field name used in the remote record
    fn remote_name(&self) -> &'static str;
}

/// Set of fields whose local value has not been confirmed by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingKeys<K: Ord>(BTreeSet<K>);

impl<K: Ord> Default for PendingKeys<K> {
    fn default() -> Self {
        Self(BTreeSet::new())
    }
}

impl<K: FieldKey> PendingKeys<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the key was not pending before
    pub fn insert(&mut self, key: K) -> bool {
        self.0.insert(key)
    }

    pub fn remove_all(&mut self, keys: &[K]) {
        for key in keys {
            self.0.remove(key);
        }
    }

    pub fn contains(&self, key: K) -> bool {
        self.0.contains(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = K> + '_ {
        self.0.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<K> {
        self.iter().collect()
    }

    pub fn is_superset(&self, other: &PendingKeys<K>) -> bool {
        self.0.is_superset(&other.0)
    }
}

impl<K: FieldKey> FromIterator<K> for PendingKeys<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A locally-owned record that is mirrored to a remote record store.
pub trait SyncEntity: Clone + Send + Sync + 'static {
    type Key: FieldKey;

    fn record_id(&self) -> &RecordId;

    /// Current local value of a field
    fn field_value(&self, key: Self::Key) -> Value;

    fn pending_remote_update_keys(&self) -> &PendingKeys<Self::Key>;

    fn remove_pending_remote_update_keys(&mut self, keys: &[Self::Key]);

    /// Remote metadata saved by the last successful upload, if any
    fn system_fields(&self) -> Option<&SystemFields>;

    fn store_system_fields(&mut self, fields: SystemFields);

    fn has_pending_remote_updates(&self) -> bool {
        !self.pending_remote_update_keys().is_empty()
    }

    /// Full snapshot of every field, carrying the stored system fields.
    ///
    /// The remote protocol takes full-record upserts, so this always includes
    /// all keys and not only the pending ones.
    fn remote_record_for_update(&self) -> RemoteRecord<Self::Key> {
        let mut record = RemoteRecord::new(self.record_id().clone(), self.system_fields().cloned());
        for key in Self::Key::ALL {
            record.set(*key, self.field_value(*key));
        }
        record
    }
}

/// Staged view of the local store inside one `LocalStore::perform` call.
pub trait EntityTransaction<E: SyncEntity> {
    fn entity(&self, id: &RecordId) -> Option<&E>;

    /// Mutable access to a live entity; `None` if it was deleted
    fn entity_mut(&mut self, id: &RecordId) -> Option<&mut E>;
}

/// Local entity store with a single serial execution context.
///
/// Every read and write the reconciler performs goes through this trait, so
/// it never runs concurrently with other mutations of the same entities.
#[async_trait]
pub trait LocalStore<E: SyncEntity>: Send + Sync {
    /// Entities with at least one pending remote update key, ordered by id
    async fn fetch_pending(&self) -> Result<Vec<E>, StorageError>;

    /// Current copies of the given entities in the given order. Ids of
    /// deleted entities are left out.
    async fn fetch(&self, ids: &[RecordId]) -> Result<Vec<E>, StorageError>;

    /// Run `work` on the store's context and commit its mutations atomically.
    ///
    /// If the commit fails no mutation made by `work` is persisted.
    async fn perform<R, F>(&self, work: F) -> Result<R, StorageError>
    where
        F: FnOnce(&mut dyn EntityTransaction<E>) -> R + Send,
        R: Send;
}

/// Remote record store accepting batched full-record upserts.
#[async_trait]
pub trait RemoteStore<K: FieldKey>: Send + Sync {
    /// Upload a batch in one request. Timeouts surface as a total failure.
    async fn upload(&self, records: &[RemoteRecord<K>]) -> UploadOutcome;

    /// Equality the remote store applies to field values
    fn values_are_equal(&self, left: &Value, right: &Value) -> bool {
        shelf_api::values_are_equal(left, right)
    }
}
