//! In-memory collaborators for exercising reconcilers without a real service

pub mod fake_remote;

pub use fake_remote::{FakeRemote, InFlightHook};
