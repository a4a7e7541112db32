use std::path::{Path, PathBuf};

use duka_core::models::{
    ConflictId, ConflictRecord, ConflictState, Customer, EntityPayload, PaymentMethod, Priority,
    Product, Sale, SyncOperation, SyncResult, SyncStatus,
};
use duka_core::{LocalRecord, LocalStore, ServerId};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use crate::cli::{ProductCommands, SaleCommands};
use crate::commands::common::{
    format_queue_lines, format_relative_time, format_sync_timestamp, normalize_record_identifier,
    queue_entry_to_item, resolve_db_path, resolve_record, summarize_payload,
};
use crate::commands::config::apply_init;
use crate::commands::records::{
    build_product, find_product_price, required_name, run_delete, run_product, run_sale,
};
use crate::commands::sync::format_sync_summary;
use crate::config_file::CliConfig;
use crate::error::CliError;

fn test_db() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("duka.db");
    (dir, path)
}

fn record_with_id(id: &str, payload: EntityPayload) -> LocalRecord {
    LocalRecord {
        local_id: id.parse().unwrap(),
        ..LocalRecord::new(payload)
    }
}

async fn seed(path: &Path, records: &[LocalRecord]) {
    let store = LocalStore::open_path(path).await.unwrap();
    for record in records {
        store
            .insert_and_enqueue(record, Priority::default_for(record.entity_type()))
            .await
            .unwrap();
    }
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
}

#[test]
fn format_sync_timestamp_returns_utc_label() {
    assert_eq!(format_sync_timestamp(0), "1970-01-01 00:00:00 UTC");
}

#[test]
fn normalize_record_identifier_rejects_empty() {
    assert!(matches!(
        normalize_record_identifier(" \n "),
        Err(CliError::EmptyRecordId)
    ));
    assert_eq!(normalize_record_identifier("  0199ab  ").unwrap(), "0199ab");
}

#[test]
fn resolve_db_path_prefers_flag_over_config() {
    let config = CliConfig {
        db_path: Some(PathBuf::from("/from/config.db")),
        ..CliConfig::default()
    };
    let flag = PathBuf::from("/from/flag.db");
    assert_eq!(resolve_db_path(Some(flag.clone()), &config).unwrap(), flag);
}

#[test]
fn build_product_validates_input() {
    let product = build_product(" Soap ", " SOAP-1 ", 150, Some(90), 12, Some(" ".into())).unwrap();
    assert_eq!(product.name, "Soap");
    assert_eq!(product.sku, "SOAP-1");
    assert_eq!(product.cost_price, Some(90));
    assert_eq!(product.stock_quantity, 12);
    assert_eq!(product.category, None);

    assert!(build_product("", "SOAP-1", 150, None, 0, None).is_err());
    assert!(build_product("Soap", " ", 150, None, 0, None).is_err());
    assert!(build_product("Soap", "SOAP-1", -1, None, 0, None).is_err());
    assert!(build_product("Soap", "SOAP-1", 150, Some(-5), 0, None).is_err());
    assert!(build_product("Soap", "SOAP-1", 150, None, -2, None).is_err());
}

#[test]
fn required_name_trims() {
    assert_eq!(required_name("  Amina ", "customer").unwrap(), "Amina");
    let error = required_name("   ", "supplier").unwrap_err();
    assert!(error.to_string().contains("supplier name cannot be empty"));
}

#[test]
fn summaries_show_the_fields_a_cashier_checks() {
    let sale = Sale::new("SKU-1", 2, 60, PaymentMethod::MobileMoney).unwrap();
    assert_eq!(
        summarize_payload(&sale.into()),
        "SKU-1 x2 = 120 mobile_money"
    );

    let mut customer = Customer::new("Amina");
    customer.phone = Some("+255700000001".into());
    assert_eq!(summarize_payload(&customer.into()), "Amina +255700000001");

    let product = Product::new("Soap", "SOAP-1", 150);
    assert_eq!(
        summarize_payload(&product.into()),
        "Soap (SOAP-1) @ 150 stock 0"
    );
}

#[test]
fn sync_summary_lists_errors_and_held_conflicts() {
    let local = EntityPayload::from(Product::new("Soap", "SOAP-1", 150));
    let mut result = SyncResult::empty(SyncStatus::Completed, 0, 0);
    result.synced = 3;
    result.failed = 1;
    result.errors.push("create sale 1: rejected: HTTP 422".to_string());
    result.conflicts.push(ConflictRecord {
        id: ConflictId::new(),
        entity_type: local.entity_type(),
        local_id: duka_core::LocalId::new(),
        server_id: None,
        operation: SyncOperation::Create,
        local,
        local_modified_at: 10,
        remote: None,
        remote_modified_at: None,
        state: ConflictState::Pending,
        detected_at: 10,
    });

    let lines = format_sync_summary(&result);
    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains("3 synced, 1 failed, 0 deferred"));
    assert!(lines[1].contains("HTTP 422"));
    assert!(lines[2].contains("create product"));
    assert!(lines[2].contains("held for review"));

    let aborted = SyncResult::empty(
        SyncStatus::Aborted {
            reason: "disk full".into(),
        },
        0,
        0,
    );
    assert!(format_sync_summary(&aborted)[0].contains("sync aborted: disk full"));
}

#[test]
fn config_init_merges_flags() {
    let existing = CliConfig {
        api_token: Some("keep-me".into()),
        ..CliConfig::default()
    };
    let updated = apply_init(
        existing,
        Some(" https://api.duka.test/v1/ ".into()),
        None,
        Some(Path::new("/srv/duka.db")),
    )
    .unwrap();

    assert_eq!(updated.api_url.as_deref(), Some("https://api.duka.test/v1"));
    assert_eq!(updated.api_token.as_deref(), Some("keep-me"));
    assert_eq!(updated.db_path, Some(PathBuf::from("/srv/duka.db")));

    assert!(apply_init(CliConfig::default(), Some("ftp://nope".into()), None, None).is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn resolve_record_supports_exact_and_prefix_id() {
    let (_dir, path) = test_db();
    seed(
        &path,
        &[
            record_with_id(
                "11111111-1111-7111-8111-111111111111",
                Customer::new("Amina").into(),
            ),
            record_with_id(
                "11111111-1111-7111-8111-222222222222",
                Customer::new("Baraka").into(),
            ),
            record_with_id(
                "22222222-2222-7222-8222-222222222222",
                Customer::new("Chausiku").into(),
            ),
        ],
    )
    .await;

    let store = LocalStore::open_path(&path).await.unwrap();
    let exact = resolve_record("11111111-1111-7111-8111-222222222222", &store)
        .await
        .unwrap();
    assert_eq!(exact.payload, EntityPayload::from(Customer::new("Baraka")));

    let by_prefix = resolve_record("2222", &store).await.unwrap();
    assert_eq!(by_prefix.payload, EntityPayload::from(Customer::new("Chausiku")));

    assert!(matches!(
        resolve_record("1111", &store).await,
        Err(CliError::AmbiguousRecordId(_))
    ));
    assert!(matches!(
        resolve_record("ffff", &store).await,
        Err(CliError::RecordNotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn product_add_writes_record_and_queues_create() {
    let (_dir, path) = test_db();
    run_product(
        ProductCommands::Add {
            name: "Soap".into(),
            sku: "SOAP-1".into(),
            price: 150,
            cost: None,
            stock: 10,
            category: None,
        },
        &path,
    )
    .await
    .unwrap();

    let store = LocalStore::open_path(&path).await.unwrap();
    let records = store.list_records(None, false, 10, 0).await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(!records[0].synced);

    let queue = store.list_queue().await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].operation, SyncOperation::Create);
    assert_eq!(queue[0].priority, Priority::Normal);
}

#[tokio::test(flavor = "multi_thread")]
async fn sale_defaults_to_product_price_and_jumps_the_queue() {
    let (_dir, path) = test_db();
    seed(
        &path,
        &[LocalRecord::new(Product::new("Soap", "SOAP-1", 150).into())],
    )
    .await;

    run_sale(
        SaleCommands::Record {
            sku: "soap-1".into(),
            quantity: 3,
            unit_price: None,
            payment: PaymentMethod::Cash,
            receipt: Some("  ".into()),
            customer: None,
        },
        &path,
    )
    .await
    .unwrap();

    let store = LocalStore::open_path(&path).await.unwrap();
    assert_eq!(find_product_price(&store, "SOAP-1").await.unwrap(), 150);

    let queue = store.list_queue().await.unwrap();
    assert_eq!(queue.len(), 2);
    assert_eq!(queue[0].priority, Priority::High);
    match &queue[0].payload {
        EntityPayload::Sale(sale) => {
            assert_eq!(sale.total_amount, 450);
            assert_eq!(sale.payment_receipt, None);
        }
        other => panic!("expected a sale, got {other:?}"),
    }

    let unknown = run_sale(
        SaleCommands::Record {
            sku: "MISSING".into(),
            quantity: 1,
            unit_price: None,
            payment: PaymentMethod::Cash,
            receipt: None,
            customer: None,
        },
        &path,
    )
    .await;
    assert!(matches!(unknown, Err(CliError::UnknownSku(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_of_never_synced_record_collapses() {
    let (_dir, path) = test_db();
    let record = LocalRecord::new(Customer::new("Amina").into());
    seed(&path, std::slice::from_ref(&record)).await;

    run_delete(&record.local_id.to_string(), &path).await.unwrap();

    let store = LocalStore::open_path(&path).await.unwrap();
    assert!(store.get_record(&record.local_id).await.unwrap().is_none());
    assert_eq!(store.queue_count().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_of_synced_record_queues_remote_delete() {
    let (_dir, path) = test_db();
    let record = LocalRecord::new(Customer::new("Amina").into());
    {
        let store = LocalStore::open_path(&path).await.unwrap();
        let entry_id = store
            .insert_and_enqueue(&record, Priority::Normal)
            .await
            .unwrap();
        store.remove_entry(entry_id).await.unwrap();
        store
            .mark_pushed(
                &record.local_id,
                ServerId(7),
                record.last_modified_at,
                record.last_modified_at,
                None,
            )
            .await
            .unwrap();
    }

    run_delete(&record.local_id.to_string()[..13], &path)
        .await
        .unwrap();

    let store = LocalStore::open_path(&path).await.unwrap();
    let stored = store.get_record(&record.local_id).await.unwrap().unwrap();
    assert!(stored.is_deleted);

    let queue = store.list_queue().await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].operation, SyncOperation::Delete);
    assert_eq!(queue[0].server_id, Some(ServerId(7)));

    let item = queue_entry_to_item(&queue[0], 5);
    assert!(!item.exhausted);
    let lines = format_queue_lines(&queue, 5);
    assert!(lines[0].contains("delete"));
    assert!(lines[0].contains("attempts 0/5"));
}
