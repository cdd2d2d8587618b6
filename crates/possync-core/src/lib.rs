//! possync Core Library
//!
//! This crate provides bidirectional synchronization between a point-of-sale
//! system's local store and its cloud backend, with offline queuing of local
//! writes.
//!
//! # Architecture
//!
//! - **Orchestrator**: owns the sync settings, credential and auto-sync
//!   timer; runs one full upload/download cycle at a time
//! - **Gateways**: the local store and the cloud API behind the same
//!   `DataGateway` trait, so the cycle is symmetric
//! - **Ledger**: SQLite-backed local store that keeps every write pending
//!   until the cloud has acknowledged it
//!
//! # Quick Start
//!
//! ```text
//! let orchestrator = Arc::new(SyncOrchestrator::new(store, local, connector, monitor));
//! orchestrator.load_configuration();
//!
//! orchestrator.login("admin", "secret").await?;
//! let result = orchestrator.full_sync().await;
//! println!("uploaded {} downloaded {}", result.uploaded, result.downloaded);
//! ```
//!
//! # Modules
//!
//! - `orchestrator`: Sync cycle, configuration and auto-sync (main entry point)
//! - `gateway`: Local and remote data gateways
//! - `storage`: Pending ledger persistence
//! - `monitor`: Network and session state
//! - `store`: Sync settings and credential persistence
//! - `entity`: Entity types and batches
//! - `model`: Configuration, results and status types
//! - `config`: Application configuration

pub mod config;
pub mod entity;
pub mod error;
pub mod gateway;
pub mod model;
pub mod monitor;
pub mod orchestrator;
pub mod storage;
pub mod store;

pub use config::Config;
pub use entity::{EntityBatch, EntityRegistry, EntityType};
pub use error::{GatewayError, Result, SyncError};
pub use gateway::{
    BearerToken, DataGateway, HttpLocalGateway, HttpRemoteConnector, HttpRemoteGateway,
    LedgerGateway, LocalDataGateway, RemoteConnector, RemoteDataGateway,
};
pub use model::{
    ConnectionTestResult, PendingCounts, SyncConfiguration, SyncResult, SyncStatusSnapshot,
    WriteOutcome,
};
pub use monitor::{ConnectivityMonitor, ConnectivityState, Transition};
pub use orchestrator::SyncOrchestrator;
pub use storage::{PendingLedger, StorageError};
pub use store::{ConfigStore, FileConfigStore, MemoryConfigStore};
