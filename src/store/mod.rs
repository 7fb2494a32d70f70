//! Persistence: wardrobe items, ingest job history, duplicate-aware writes.

mod libsql_backend;
mod migrations;
pub mod traits;
pub mod writer;

pub use libsql_backend::LibSqlStore;
pub use traits::{JobRecord, JobState, WardrobeItem, WardrobeStore};
pub use writer::{DuplicateRule, WardrobeWriter, WriteOutcome};
