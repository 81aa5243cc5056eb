pub mod item_errors;
pub mod report;
pub mod upstream;

#[cfg(test)]
mod upstream_tests;

pub use item_errors::{ItemErrorHandler, LogItemErrors};
pub use report::{FailureInfo, PendingInfo, ReconcileReport};
pub use upstream::UpstreamReconciler;
