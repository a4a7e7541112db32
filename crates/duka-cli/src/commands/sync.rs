use std::path::Path;
use std::time::Duration;

use duka_core::models::{SyncResult, SyncStatus};

use crate::cli::SyncCommands;
use crate::commands::common::{
    build_engine, format_queue_lines, format_record_lines, format_sync_timestamp, open_store,
    queue_entry_to_item, QueueListItem,
};
use crate::config_file::{env_lookup, CliConfig};
use crate::error::CliError;

pub async fn run_sync(
    command: Option<SyncCommands>,
    config: &CliConfig,
    db_path: &Path,
) -> Result<(), CliError> {
    match command {
        None => run_sync_once(config, db_path).await,
        Some(SyncCommands::Watch { interval_secs }) => {
            run_sync_watch(interval_secs, config, db_path).await
        }
        Some(SyncCommands::Status) => run_sync_status(config, db_path).await,
        Some(SyncCommands::Queue { json }) => run_sync_queue(json, config, db_path).await,
        Some(SyncCommands::ClearFailed) => run_clear_failed(config, db_path).await,
    }
}

pub async fn run_sync_once(config: &CliConfig, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let engine = build_engine(store, config)?;

    let result = engine.sync_all().await;
    for line in format_sync_summary(&result) {
        println!("{line}");
    }

    match result.status {
        SyncStatus::Aborted { reason } => Err(CliError::SyncAborted(reason)),
        _ => Ok(()),
    }
}

pub async fn run_sync_watch(
    interval_secs: Option<u64>,
    config: &CliConfig,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let engine = build_engine(store, config)?;
    let interval = interval_secs.map_or_else(
        || engine.config().auto_sync_interval(),
        Duration::from_secs,
    );

    let subscription = engine.subscribe(|result| {
        for line in format_sync_summary(result) {
            println!("{line}");
        }
    });

    engine.sync_all().await;
    engine.start_auto_sync(interval)?;
    println!(
        "Syncing every {}s. Press Ctrl-C to stop.",
        interval.as_secs()
    );

    tokio::signal::ctrl_c().await?;
    engine.stop_auto_sync();
    subscription.unsubscribe();
    println!("Stopped.");
    Ok(())
}

pub async fn run_sync_status(config: &CliConfig, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let sync_config = config.sync_config(env_lookup)?;

    let pending = store.queue_count().await?;
    let exhausted = store.list_exhausted(sync_config.max_attempts).await?;
    let unsynced = store.count_unsynced().await?;
    let last_sync_at = store.last_sync_at().await?;
    let attention = store.needs_attention().await?;
    let server = config
        .remote_config(env_lookup)?
        .map_or_else(|| "not configured".to_string(), |remote| remote.base_url);

    println!("Server:          {server}");
    println!("Database:        {}", db_path.display());
    println!(
        "Last sync:       {}",
        last_sync_at.map_or_else(|| "never".to_string(), format_sync_timestamp)
    );
    println!("Queued changes:  {pending}");
    println!(
        "Failed changes:  {} (retry budget {} used up)",
        exhausted.len(),
        sync_config.max_attempts
    );
    println!("Unsynced records: {unsynced}");

    if !attention.is_empty() {
        println!();
        println!("Records needing attention (unsynced, nothing queued):");
        for line in format_record_lines(&attention) {
            println!("  {line}");
        }
    }
    Ok(())
}

pub async fn run_sync_queue(
    as_json: bool,
    config: &CliConfig,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let max_attempts = config.sync_config(env_lookup)?.max_attempts;
    let entries = store.list_queue().await?;

    if as_json {
        let json_items = entries
            .iter()
            .map(|entry| queue_entry_to_item(entry, max_attempts))
            .collect::<Vec<QueueListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("Sync queue is empty.");
        return Ok(());
    }

    for line in format_queue_lines(&entries, max_attempts) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_clear_failed(config: &CliConfig, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let max_attempts = config.sync_config(env_lookup)?.max_attempts;
    let removed = store.clear_exhausted(max_attempts).await?;
    println!("Cleared {removed} failed change(s)");
    Ok(())
}

pub fn format_sync_summary(result: &SyncResult) -> Vec<String> {
    let finished = format_sync_timestamp(result.finished_at);
    let headline = match &result.status {
        SyncStatus::Completed => format!(
            "{finished}  sync completed: {} synced, {} failed, {} deferred, {} conflicts resolved",
            result.synced, result.failed, result.deferred, result.conflicts_resolved
        ),
        SyncStatus::AlreadyRunning => format!("{finished}  sync already in progress"),
        SyncStatus::Offline => format!("{finished}  offline; queue left untouched"),
        SyncStatus::Aborted { reason } => format!("{finished}  sync aborted: {reason}"),
    };

    let mut lines = vec![headline];
    lines.extend(result.errors.iter().map(|error| format!("  {error}")));
    lines.extend(result.conflicts.iter().map(|conflict| {
        format!(
            "  conflict {}: {} {} {} held for review",
            conflict.id, conflict.operation, conflict.entity_type, conflict.local_id
        )
    }));
    lines
}
