use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use duka_core::models::PaymentMethod;

#[derive(Parser)]
#[command(name = "duka")]
#[command(about = "Offline-first point of sale: record locally, sync when online")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage products
    Product {
        #[command(subcommand)]
        command: ProductCommands,
    },
    /// Record and list sales
    Sale {
        #[command(subcommand)]
        command: SaleCommands,
    },
    /// Manage customers
    Customer {
        #[command(subcommand)]
        command: CustomerCommands,
    },
    /// Manage suppliers
    Supplier {
        #[command(subcommand)]
        command: SupplierCommands,
    },
    /// Operate on any local record
    Record {
        #[command(subcommand)]
        command: RecordCommands,
    },
    /// Push queued changes to the server (one cycle without a subcommand)
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
    },
    /// Configure the server endpoint and local database
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Args, Clone, Copy, Debug)]
pub struct ListArgs {
    /// Number of records to show
    #[arg(short, long, default_value = "20")]
    pub limit: usize,
    /// Include records deleted locally but not yet pushed
    #[arg(long)]
    pub all: bool,
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum ProductCommands {
    /// Add a product
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        sku: String,
        /// Selling price in the smallest currency unit
        #[arg(long)]
        price: i64,
        /// Purchase cost in the smallest currency unit
        #[arg(long)]
        cost: Option<i64>,
        /// Units on hand
        #[arg(long, default_value = "0")]
        stock: i64,
        #[arg(long)]
        category: Option<String>,
    },
    /// List products
    List(ListArgs),
}

#[derive(Subcommand)]
pub enum SaleCommands {
    /// Record a sale
    Record {
        /// SKU of the product sold
        #[arg(long)]
        sku: String,
        #[arg(short, long, default_value = "1")]
        quantity: i64,
        /// Unit price in the smallest currency unit (defaults to the product's price)
        #[arg(long)]
        unit_price: Option<i64>,
        /// cash, mobile_money, card or bank
        #[arg(long, default_value = "cash")]
        payment: PaymentMethod,
        /// Payment provider receipt (e.g. mobile money code)
        #[arg(long)]
        receipt: Option<String>,
        #[arg(long)]
        customer: Option<String>,
    },
    /// List sales
    List(ListArgs),
}

#[derive(Subcommand)]
pub enum CustomerCommands {
    /// Add a customer
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// List customers
    List(ListArgs),
}

#[derive(Subcommand)]
pub enum SupplierCommands {
    /// Add a supplier
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        contact: Option<String>,
    },
    /// List suppliers
    List(ListArgs),
}

#[derive(Subcommand)]
pub enum RecordCommands {
    /// Delete a record
    Delete {
        /// Record ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Keep syncing on an interval until interrupted
    Watch {
        /// Seconds between cycles (defaults to the configured interval)
        #[arg(long, value_name = "SECS")]
        interval_secs: Option<u64>,
    },
    /// Show queue depth, last sync time and records needing attention
    Status,
    /// List queued changes
    Queue {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Drop queued changes that used up their retry budget
    ClearFailed,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update the config file (also stores --db-path when given)
    Init {
        /// Server API base URL
        #[arg(long, value_name = "URL")]
        api_url: Option<String>,
        /// Bearer token sent with every request
        #[arg(long, value_name = "TOKEN")]
        api_token: Option<String>,
    },
    /// Print the effective configuration
    Show,
}
