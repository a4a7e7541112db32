//! Synchronization: the remote boundary, conflict resolution and the engine
//! that drains the local queue.

mod backoff;
mod conflict;
mod connectivity;
mod engine;
mod observer;
mod remote;

#[cfg(test)]
mod tests;

pub use backoff::Backoff;
pub use conflict::{resolve, Decision, Resolution, VersionedPayload};
pub use connectivity::{AssumeOnline, Connectivity, ManualConnectivity};
pub use engine::SyncEngine;
pub use observer::{Observers, Subscription};
pub use remote::{
    FailureClass, HttpRemoteApi, RemoteAck, RemoteApi, RemoteError, RemoteResult, RemoteSnapshot,
    IDEMPOTENCY_HEADER,
};
