//! Database layer for Duka

mod connection;
mod migrations;
mod queue_repository;
mod record_repository;
mod state_repository;

pub use connection::{finish_transaction, Database};
pub use queue_repository::{LibSqlSyncQueue, SyncQueue};
pub use record_repository::{LibSqlRecordRepository, RecordRepository};
pub use state_repository::{LibSqlSyncStateRepository, SyncStateRepository};
