use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use duka_core::models::{
    EntityPayload, EntityType, LocalId, LocalRecord, Priority, QueueEntry, SyncOperation,
};
use duka_core::sync::{AssumeOnline, HttpRemoteApi};
use duka_core::{LocalStore, SyncEngine};
use serde::Serialize;
use serde_json::Value;

use crate::config_file::{env_lookup, CliConfig};
use crate::error::CliError;

const SHORT_ID_LEN: usize = 13;

#[derive(Debug, Serialize)]
pub struct RecordListItem {
    pub id: String,
    pub entity_type: EntityType,
    pub server_id: Option<i64>,
    pub synced: bool,
    pub deleted: bool,
    pub summary: String,
    pub data: Value,
    pub created_at: i64,
    pub last_modified_at: i64,
    pub relative_time: String,
}

#[derive(Debug, Serialize)]
pub struct QueueListItem {
    pub id: i64,
    pub operation: SyncOperation,
    pub entity_type: EntityType,
    pub local_id: String,
    pub priority: Priority,
    pub attempts: u32,
    pub exhausted: bool,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub created_at_iso: String,
}

pub fn resolve_db_path(
    cli_db_path: Option<PathBuf>,
    config: &CliConfig,
) -> Result<PathBuf, CliError> {
    match cli_db_path.or_else(|| config.db_path(env_lookup)) {
        Some(path) => Ok(path),
        None => default_db_path(),
    }
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("duka").join("duka.db"))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}

pub async fn open_store(path: &Path) -> Result<LocalStore, CliError> {
    Ok(LocalStore::open_path(path).await?)
}

/// Engine over the configured server. The CLI has no connectivity probe, so
/// the device is assumed online and unreachable servers surface as retryable
/// failures.
pub fn build_engine(store: LocalStore, config: &CliConfig) -> Result<SyncEngine, CliError> {
    let remote_config = config
        .remote_config(env_lookup)?
        .ok_or(CliError::SyncNotConfigured)?;
    let sync_config = config.sync_config(env_lookup)?;
    let remote = HttpRemoteApi::new(&remote_config)?;

    tracing::debug!(base_url = %remote_config.base_url, "Sync target configured");
    Ok(SyncEngine::new(
        store,
        Arc::new(remote),
        Arc::new(AssumeOnline::default()),
        sync_config,
    )?)
}

pub async fn list_all_records(
    store: &LocalStore,
    entity_type: Option<EntityType>,
) -> Result<Vec<LocalRecord>, CliError> {
    const PAGE_SIZE: usize = 500;

    let mut records = Vec::new();
    let mut offset = 0usize;

    loop {
        let batch = store
            .list_records(entity_type, false, PAGE_SIZE, offset)
            .await?;
        let count = batch.len();
        records.extend(batch);

        if count < PAGE_SIZE {
            break;
        }
        offset += count;
    }

    Ok(records)
}

pub fn normalize_record_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyRecordId)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Find a live record by full id or unique id prefix.
pub async fn resolve_record(query: &str, store: &LocalStore) -> Result<LocalRecord, CliError> {
    if let Ok(local_id) = query.parse::<LocalId>() {
        if let Some(record) = store.get_record(&local_id).await? {
            if !record.is_deleted {
                return Ok(record);
            }
        }
    }

    let prefix = query.to_ascii_lowercase();
    let mut matching = list_all_records(store, None)
        .await?
        .into_iter()
        .filter(|record| record.local_id.to_string().starts_with(&prefix))
        .collect::<Vec<_>>();

    match matching.len() {
        0 => Err(CliError::RecordNotFound(query.to_string())),
        1 => Ok(matching.remove(0)),
        _ => {
            let options = matching
                .iter()
                .take(3)
                .map(|record| short_id(&record.local_id))
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousRecordId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn short_id(id: &LocalId) -> String {
    id.to_string().chars().take(SHORT_ID_LEN).collect()
}

/// One-line human summary of a payload.
pub fn summarize_payload(payload: &EntityPayload) -> String {
    match payload {
        EntityPayload::Product(product) => format!(
            "{} ({}) @ {} stock {}",
            product.name, product.sku, product.price, product.stock_quantity
        ),
        EntityPayload::Sale(sale) => format!(
            "{} x{} = {} {}",
            sale.product_sku, sale.quantity, sale.total_amount, sale.payment_method
        ),
        EntityPayload::Customer(customer) => match &customer.phone {
            Some(phone) => format!("{} {phone}", customer.name),
            None => customer.name.clone(),
        },
        EntityPayload::Supplier(supplier) => match &supplier.contact_person {
            Some(contact) => format!("{} (attn {contact})", supplier.name),
            None => supplier.name.clone(),
        },
        EntityPayload::Order(order) => format!(
            "order from {} ({} lines, {})",
            order.supplier_ref,
            order.lines.len(),
            order.status.as_str()
        ),
    }
}

pub fn sync_marker(record: &LocalRecord) -> &'static str {
    if record.is_deleted {
        "deleted"
    } else if record.synced {
        "synced"
    } else {
        "pending"
    }
}

pub fn format_record_lines(records: &[LocalRecord]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    records
        .iter()
        .map(|record| {
            let short_id = short_id(&record.local_id);
            let summary = summarize_payload(&record.payload);
            let relative_time = format_relative_time(record.last_modified_at, now_ms);
            format!(
                "{short_id:<13}  {:<7}  {summary:<48}  {relative_time}",
                sync_marker(record)
            )
        })
        .collect()
}

pub fn record_to_list_item(record: &LocalRecord) -> Result<RecordListItem, CliError> {
    let now_ms = Utc::now().timestamp_millis();
    Ok(RecordListItem {
        id: record.local_id.to_string(),
        entity_type: record.entity_type(),
        server_id: record.server_id.map(|server_id| server_id.0),
        synced: record.synced,
        deleted: record.is_deleted,
        summary: summarize_payload(&record.payload),
        data: record.payload.to_value()?,
        created_at: record.created_at,
        last_modified_at: record.last_modified_at,
        relative_time: format_relative_time(record.last_modified_at, now_ms),
    })
}

pub fn queue_entry_to_item(entry: &QueueEntry, max_attempts: u32) -> QueueListItem {
    QueueListItem {
        id: entry.id.0,
        operation: entry.operation,
        entity_type: entry.entity_type,
        local_id: entry.local_id.to_string(),
        priority: entry.priority,
        attempts: entry.attempts,
        exhausted: entry.attempts >= max_attempts,
        last_error: entry.last_error.clone(),
        created_at: entry.created_at,
        created_at_iso: format_sync_timestamp(entry.created_at),
    }
}

pub fn format_queue_lines(entries: &[QueueEntry], max_attempts: u32) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            let mut line = format!(
                "#{:<5} {:<6}  {:<8}  {:<6}  {}  attempts {}/{max_attempts}",
                entry.id.0,
                entry.priority.as_str(),
                entry.entity_type.as_str(),
                entry.operation.as_str(),
                short_id(&entry.local_id),
                entry.attempts,
            );
            if let Some(error) = &entry.last_error {
                line.push_str("  last error: ");
                line.push_str(error);
            }
            line
        })
        .collect()
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}
