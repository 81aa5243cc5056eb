//! Remote-side record representation
//!
//! A `RemoteRecord` is the full snapshot of one local entity as it is sent to
//! the remote record store. It carries the entity's `SystemFields` so the
//! store can tell an update of an existing record from a create.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a record in the remote store (and of the matching local entity).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Generate a fresh random record name
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for RecordId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Remote system metadata for a record.
///
/// Opaque to the sync core: it is stored on the local entity after every
/// successful upload and sent back unchanged with the next one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemFields {
    /// Version stamp assigned by the remote store on every save
    pub change_tag: String,
    pub modified_at: DateTime<Utc>,
}

impl SystemFields {
    pub fn new(change_tag: impl Into<String>, modified_at: DateTime<Utc>) -> Self {
        Self {
            change_tag: change_tag.into(),
            modified_at,
        }
    }
}

/// Full-record snapshot of an entity, keyed by the entity's field keys.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteRecord<K: Ord> {
    id: RecordId,
    system_fields: Option<SystemFields>,
    fields: BTreeMap<K, crate::Value>,
}

impl<K: Ord> RemoteRecord<K> {
    pub fn new(id: RecordId, system_fields: Option<SystemFields>) -> Self {
        Self {
            id,
            system_fields,
            fields: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn system_fields(&self) -> Option<&SystemFields> {
        self.system_fields.as_ref()
    }

    /// True when the record has never been saved to the remote store
    pub fn is_new(&self) -> bool {
        self.system_fields.is_none()
    }

    pub fn set(&mut self, key: K, value: crate::Value) {
        self.fields.insert(key, value);
    }

    pub fn get(&self, key: &K) -> Option<&crate::Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&K, &crate::Value)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
