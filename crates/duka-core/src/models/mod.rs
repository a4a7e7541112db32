//! Data models for Duka

mod conflict;
mod customer;
mod order;
mod payload;
mod product;
mod queue;
mod record;
mod sale;
mod supplier;
mod sync_result;

pub use conflict::{ConflictChoice, ConflictId, ConflictRecord, ConflictState};
pub use customer::Customer;
pub use order::{Order, OrderLine, OrderStatus};
pub use payload::EntityPayload;
pub use product::Product;
pub use queue::{NewQueueEntry, Priority, QueueEntry, QueueEntryId, SyncOperation};
pub use record::{EntityType, LocalId, LocalRecord, ServerId};
pub use sale::{PaymentMethod, Sale};
pub use supplier::Supplier;
pub use sync_result::{SyncResult, SyncStatus};
