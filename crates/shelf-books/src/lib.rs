//! Book entity and its upstream change processor

pub mod book_updater;
pub mod models;


pub use book_updater::BookUpdater;
pub use models::{Book, BookKey, ReadState};
