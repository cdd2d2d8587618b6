//! Storage layer
//!
//! Local persistence for the pending-operation ledger (SQLite) and the
//! typed errors shared with the file-backed config store.

pub mod error;
pub mod ledger;
pub mod schema;

pub use error::{StorageError, StorageResult};
pub use ledger::PendingLedger;
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};
