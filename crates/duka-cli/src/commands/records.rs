use std::path::Path;

use duka_core::models::{Customer, EntityPayload, EntityType, Priority, Product, Sale, Supplier};
use duka_core::services::DeleteOutcome;
use duka_core::util::{now_millis, normalize_text_option};
use duka_core::{LocalRecord, LocalStore};

use crate::cli::{
    CustomerCommands, ListArgs, ProductCommands, RecordCommands, SaleCommands, SupplierCommands,
};
use crate::commands::common::{
    format_record_lines, list_all_records, normalize_record_identifier, open_store,
    record_to_list_item, resolve_record,
};
use crate::error::CliError;

pub async fn run_product(command: ProductCommands, db_path: &Path) -> Result<(), CliError> {
    match command {
        ProductCommands::Add {
            name,
            sku,
            price,
            cost,
            stock,
            category,
        } => {
            let product = build_product(&name, &sku, price, cost, stock, category)?;
            create_record(product.into(), db_path).await
        }
        ProductCommands::List(args) => run_list(EntityType::Product, args, db_path).await,
    }
}

pub async fn run_sale(command: SaleCommands, db_path: &Path) -> Result<(), CliError> {
    match command {
        SaleCommands::Record {
            sku,
            quantity,
            unit_price,
            payment,
            receipt,
            customer,
        } => {
            let store = open_store(db_path).await?;
            let sku = sku.trim().to_string();
            let unit_price = match unit_price {
                Some(price) => price,
                None => find_product_price(&store, &sku).await?,
            };

            let mut sale = Sale::new(sku, quantity, unit_price, payment)?;
            if let Some(receipt) = normalize_text_option(receipt) {
                sale = sale.with_receipt(receipt);
            }
            if let Some(customer) = normalize_text_option(customer) {
                sale = sale.with_customer(customer);
            }
            insert_record(&store, sale.into()).await
        }
        SaleCommands::List(args) => run_list(EntityType::Sale, args, db_path).await,
    }
}

pub async fn run_customer(command: CustomerCommands, db_path: &Path) -> Result<(), CliError> {
    match command {
        CustomerCommands::Add { name, phone, email } => {
            let mut customer = Customer::new(required_name(&name, "customer")?);
            customer.phone = normalize_text_option(phone);
            customer.email = normalize_text_option(email);
            create_record(customer.into(), db_path).await
        }
        CustomerCommands::List(args) => run_list(EntityType::Customer, args, db_path).await,
    }
}

pub async fn run_supplier(command: SupplierCommands, db_path: &Path) -> Result<(), CliError> {
    match command {
        SupplierCommands::Add {
            name,
            phone,
            email,
            contact,
        } => {
            let mut supplier = Supplier::new(required_name(&name, "supplier")?);
            supplier.phone = normalize_text_option(phone);
            supplier.email = normalize_text_option(email);
            supplier.contact_person = normalize_text_option(contact);
            create_record(supplier.into(), db_path).await
        }
        SupplierCommands::List(args) => run_list(EntityType::Supplier, args, db_path).await,
    }
}

pub async fn run_record(command: RecordCommands, db_path: &Path) -> Result<(), CliError> {
    match command {
        RecordCommands::Delete { id } => run_delete(&id, db_path).await,
    }
}

pub async fn run_delete(id: &str, db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_record_identifier(id)?;
    let store = open_store(db_path).await?;
    let record = resolve_record(&normalized_id, &store).await?;

    let outcome = store
        .delete_and_enqueue(
            &record.local_id,
            now_millis(),
            Priority::default_for(record.entity_type()),
        )
        .await?;

    match outcome {
        DeleteOutcome::Queued(_) => println!("{}  delete queued", record.local_id),
        DeleteOutcome::Collapsed { .. } => {
            println!("{}  removed (never synced)", record.local_id);
        }
    }
    Ok(())
}

async fn run_list(entity_type: EntityType, args: ListArgs, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let records = store
        .list_records(Some(entity_type), args.all, args.limit, 0)
        .await?;

    if args.json {
        let json_items = records
            .iter()
            .map(record_to_list_item)
            .collect::<Result<Vec<_>, _>>()?;
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if records.is_empty() {
        println!("No {entity_type} records.");
    } else {
        for line in format_record_lines(&records) {
            println!("{line}");
        }
    }

    Ok(())
}

async fn create_record(payload: EntityPayload, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    insert_record(&store, payload).await
}

async fn insert_record(store: &LocalStore, payload: EntityPayload) -> Result<(), CliError> {
    let record = LocalRecord::new(payload);
    store
        .insert_and_enqueue(&record, Priority::default_for(record.entity_type()))
        .await?;

    tracing::debug!(local_id = %record.local_id, "Queued {} for sync", record.entity_type());
    println!("{}", record.local_id);
    Ok(())
}

pub fn build_product(
    name: &str,
    sku: &str,
    price: i64,
    cost: Option<i64>,
    stock: i64,
    category: Option<String>,
) -> Result<Product, CliError> {
    let name = required_name(name, "product")?;
    let sku = sku.trim();
    if sku.is_empty() {
        return Err(invalid("product SKU cannot be empty"));
    }
    if price < 0 || cost.is_some_and(|cost| cost < 0) {
        return Err(invalid("prices cannot be negative"));
    }
    if stock < 0 {
        return Err(invalid("stock cannot be negative"));
    }

    let mut product = Product::new(name, sku, price);
    product.cost_price = cost;
    product.stock_quantity = stock;
    product.category = normalize_text_option(category);
    Ok(product)
}

pub fn required_name(name: &str, kind: &str) -> Result<String, CliError> {
    normalize_text_option(Some(name.to_string()))
        .ok_or_else(|| invalid(&format!("{kind} name cannot be empty")))
}

/// Current price of the live product with this SKU.
pub async fn find_product_price(store: &LocalStore, sku: &str) -> Result<i64, CliError> {
    list_all_records(store, Some(EntityType::Product))
        .await?
        .into_iter()
        .find_map(|record| match record.payload {
            EntityPayload::Product(product) if product.sku.eq_ignore_ascii_case(sku) => {
                Some(product.price)
            }
            _ => None,
        })
        .ok_or_else(|| CliError::UnknownSku(sku.to_string()))
}

fn invalid(message: &str) -> CliError {
    CliError::Core(duka_core::Error::InvalidInput(message.to_string()))
}
