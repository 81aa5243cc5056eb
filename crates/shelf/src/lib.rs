//! Upstream sync core
//!
//! Pushes locally edited entities to a remote record store with per-field
//! dirty tracking. See [`sync::UpstreamReconciler`] for the pass model.

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod storage;
pub mod sync;
pub mod testing;

pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use storage::{MemoryStore, StorageError};
pub use sync::{ItemErrorHandler, LogItemErrors, ReconcileReport, UpstreamReconciler};
