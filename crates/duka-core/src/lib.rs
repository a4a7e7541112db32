//! duka-core - Core library for Duka
//!
//! Local records for an offline-first point of sale, the durable sync queue,
//! and the engine that replays queued mutations against the server.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

pub use config::{RemoteConfig, SyncConfig};
pub use error::{Error, Result};
pub use models::{EntityPayload, EntityType, LocalId, LocalRecord, ServerId, SyncResult};
pub use services::LocalStore;
pub use state::SyncState;
pub use sync::SyncEngine;
