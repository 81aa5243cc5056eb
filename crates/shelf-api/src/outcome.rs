//! Upload outcomes reported by a remote record store

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::record::{RecordId, SystemFields};

/// Raw classification of a per-record failure.
///
/// No retry policy is attached; callers above the sync core decide what is
/// retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoteErrorKind {
    Network,
    /// The server copy changed since our last save (stale change tag)
    Conflict,
    Quota,
    Unknown,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteErrorKind::Network => write!(f, "network"),
            RemoteErrorKind::Conflict => write!(f, "conflict"),
            RemoteErrorKind::Quota => write!(f, "quota"),
            RemoteErrorKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Failure of a single record inside an otherwise processed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind} error: {detail}")]
pub struct ItemError {
    pub kind: RemoteErrorKind,
    pub detail: String,
}

impl ItemError {
    pub fn new(kind: RemoteErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn network(detail: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Network, detail)
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Conflict, detail)
    }

    pub fn quota(detail: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Quota, detail)
    }

    pub fn unknown(detail: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Unknown, detail)
    }
}

/// Failure of a whole upload request. Nothing in the batch was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum TransportError {
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Request timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },

    #[error("Service unavailable: {message}")]
    ServiceUnavailable {
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Request rejected: {message}")]
    Rejected { message: String },
}

/// Result of uploading one batch of records.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    /// Every record was saved; `saved` holds the new system fields per record
    AllSucceeded {
        saved: HashMap<RecordId, SystemFields>,
    },
    /// Some records were saved, the others failed individually
    PartialFailure {
        saved: HashMap<RecordId, SystemFields>,
        failed: HashMap<RecordId, ItemError>,
    },
    TotalFailure(TransportError),
}

impl UploadOutcome {
    /// Build the outcome from per-record results
    pub fn from_results(
        saved: HashMap<RecordId, SystemFields>,
        failed: HashMap<RecordId, ItemError>,
    ) -> Self {
        if failed.is_empty() {
            UploadOutcome::AllSucceeded { saved }
        } else {
            UploadOutcome::PartialFailure { saved, failed }
        }
    }

    pub fn is_total_failure(&self) -> bool {
        matches!(self, UploadOutcome::TotalFailure(_))
    }
}
