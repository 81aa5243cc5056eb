//! In-memory local store
//!
//! The entity map sits behind a `tokio::sync::Mutex`, which plays the role of
//! the store's serial execution context. `perform` stages every entity it
//! touches and swaps the staged copies in only when the closure finished, so
//! a failed commit leaves the store exactly as it was.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::PoisonError;
use tokio::sync::Mutex;
use tracing::debug;

use shelf_api::RecordId;

use crate::core::{EntityTransaction, LocalStore, SyncEntity};
use crate::storage::types::{Result, StorageError};

pub struct MemoryStore<E: SyncEntity> {
    entities: Mutex<HashMap<RecordId, E>>,
    commit_failure: std::sync::Mutex<Option<String>>,
}

impl<E: SyncEntity> MemoryStore<E> {
    pub fn new() -> Self {
        Self {
            entities: Mutex::new(HashMap::new()),
            commit_failure: std::sync::Mutex::new(None),
        }
    }

    pub fn with_entities(entities: impl IntoIterator<Item = E>) -> Self {
        let entities = entities
            .into_iter()
            .map(|entity| (entity.record_id().clone(), entity))
            .collect();
        Self {
            entities: Mutex::new(entities),
            commit_failure: std::sync::Mutex::new(None),
        }
    }

    /// Insert or replace an entity
    pub async fn insert(&self, entity: E) {
        self.entities
            .lock()
            .await
            .insert(entity.record_id().clone(), entity);
    }

    pub async fn delete(&self, id: &RecordId) -> Option<E> {
        let removed = self.entities.lock().await.remove(id);
        debug!("[MemoryStore] Deleted {}: {}", id, removed.is_some());
        removed
    }

    pub async fn get(&self, id: &RecordId) -> Option<E> {
        self.entities.lock().await.get(id).cloned()
    }

    /// All entities, ordered by id
    pub async fn all(&self) -> Vec<E> {
        let entities = self.entities.lock().await;
        let mut all: Vec<E> = entities.values().cloned().collect();
        all.sort_by(|a, b| a.record_id().cmp(b.record_id()));
        all
    }

    /// Mutate one entity on the store's context
    pub async fn update<R, F>(&self, id: &RecordId, mutate: F) -> Result<R>
    where
        F: FnOnce(&mut E) -> R + Send,
        R: Send,
    {
        self.perform(|tx| tx.entity_mut(id).map(mutate))
            .await?
            .ok_or_else(|| StorageError::NotFound { id: id.clone() })
    }

    /// Make the next commit fail with the given reason
    pub fn fail_next_commit(&self, reason: impl Into<String>) {
        *self
            .commit_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(reason.into());
    }

    fn take_commit_failure(&self) -> Option<String> {
        self.commit_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl<E: SyncEntity> Default for MemoryStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy-on-write view over the committed entity map
struct MemoryTransaction<'a, E: SyncEntity> {
    committed: &'a HashMap<RecordId, E>,
    touched: HashMap<RecordId, E>,
}

impl<E: SyncEntity> EntityTransaction<E> for MemoryTransaction<'_, E> {
    fn entity(&self, id: &RecordId) -> Option<&E> {
        self.touched.get(id).or_else(|| self.committed.get(id))
    }

    fn entity_mut(&mut self, id: &RecordId) -> Option<&mut E> {
        if !self.touched.contains_key(id) {
            let entity = self.committed.get(id)?.clone();
            self.touched.insert(id.clone(), entity);
        }
        self.touched.get_mut(id)
    }
}

#[async_trait]
impl<E: SyncEntity> LocalStore<E> for MemoryStore<E> {
    async fn fetch_pending(&self) -> Result<Vec<E>> {
        let entities = self.entities.lock().await;
        let mut pending: Vec<E> = entities
            .values()
            .filter(|entity| entity.has_pending_remote_updates())
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.record_id().cmp(b.record_id()));
        debug!(
            "[MemoryStore] fetch_pending: {} of {} entities pending",
            pending.len(),
            entities.len()
        );
        Ok(pending)
    }

    async fn fetch(&self, ids: &[RecordId]) -> Result<Vec<E>> {
        let entities = self.entities.lock().await;
        Ok(ids.iter().filter_map(|id| entities.get(id).cloned()).collect())
    }

    async fn perform<R, F>(&self, work: F) -> Result<R>
    where
        F: FnOnce(&mut dyn EntityTransaction<E>) -> R + Send,
        R: Send,
    {
        let mut entities = self.entities.lock().await;
        let (result, touched) = {
            let mut tx = MemoryTransaction {
                committed: &*entities,
                touched: HashMap::new(),
            };
            let result = work(&mut tx);
            (result, tx.touched)
        };

        if let Some(reason) = self.take_commit_failure() {
            debug!(
                "[MemoryStore] Discarding {} staged entities: {}",
                touched.len(),
                reason
            );
            return Err(StorageError::CommitFailed(reason));
        }

        debug!("[MemoryStore] Committing {} entities", touched.len());
        entities.extend(touched);
        Ok(result)
    }
}
