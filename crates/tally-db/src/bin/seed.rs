//! # Seed Data Generator
//!
//! Populates a development database with stores, products, stock and
//! member tickets.
//!
//! ## Usage
//! ```bash
//! # 200 products (default) into the configured database
//! cargo run -p tally-db --bin seed
//!
//! # Custom amount and path
//! cargo run -p tally-db --bin seed -- --products 1000 --db ./data/tally.db
//!
//! # Read settings from a config file (env overrides still apply)
//! cargo run -p tally-db --bin seed -- --config ./tally.toml
//! ```
//!
//! ## Generated Data
//! - Two stores
//! - Products with SKU `{CATEGORY}-{INDEX}` and a 13-digit barcode
//! - One stock entry per product per store, some at or below threshold
//! - Three members, each holding a coffee and a car wash ticket

use std::env;
use std::path::PathBuf;

use chrono::{Duration, Utc};
use tally_db::{init_tracing, Database, EngineConfig, NewProduct};
use tracing::{info, warn};

const STORES: &[&str] = &["Harajuku", "Shimokitazawa"];

/// Product categories: (code, base price in yen, names)
const CATEGORIES: &[(&str, i64, &[&str])] = &[
    (
        "BEV",
        150,
        &["Green Tea", "Black Coffee", "Cola", "Mineral Water", "Orange Juice", "Lemon Soda"],
    ),
    (
        "SNK",
        200,
        &["Potato Chips", "Rice Crackers", "Chocolate Bar", "Gummy Candy", "Pretzels"],
    ),
    (
        "BAK",
        280,
        &["Melon Bread", "Curry Bread", "Croissant", "Anpan", "Baguette"],
    ),
    (
        "DLI",
        480,
        &["Onigiri Salmon", "Onigiri Tuna", "Bento Karaage", "Sandwich Egg", "Salad Bowl"],
    ),
];

/// Ticket products issued to every seeded member: (type, uses, valid days)
const TICKETS: &[(&str, i64, i64)] = &[("coffee-10", 10, 90), ("car-wash-5", 5, 180)];

const MEMBER_IDS: &[i64] = &[1001, 1002, 1003];

struct Args {
    db_path: Option<PathBuf>,
    config_path: Option<PathBuf>,
    products: usize,
}

fn parse_args() -> Option<Args> {
    let args: Vec<String> = env::args().collect();
    let mut parsed = Args {
        db_path: None,
        config_path: None,
        products: 200,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--products" | "-p" => {
                if let Some(value) = args.get(i + 1) {
                    parsed.products = value.parse().unwrap_or(200);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if let Some(value) = args.get(i + 1) {
                    parsed.db_path = Some(PathBuf::from(value));
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if let Some(value) = args.get(i + 1) {
                    parsed.config_path = Some(PathBuf::from(value));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tally Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -p, --products <N>   Number of products to generate (default: 200)");
                println!("  -d, --db <PATH>      Database file path (overrides config)");
                println!("  -c, --config <FILE>  TOML config file");
                println!("  -h, --help           Show this help message");
                return None;
            }
            other => warn!(argument = other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    Some(parsed)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let Some(args) = parse_args() else {
        return Ok(());
    };

    let mut config = EngineConfig::load(args.config_path.as_deref())?;
    if let Some(path) = args.db_path {
        config.database.path = path;
    }

    let db = Database::new(config.db_config()).await?;
    info!(path = %config.database.path.display(), "Connected to database");

    // Barcodes are unique, so the first one tells us whether we ran before
    if db.catalog().find_by_barcode(&barcode_for(0)).await?.is_some() {
        warn!("Database already seeded; delete the file to regenerate");
        return Ok(());
    }

    let start = std::time::Instant::now();

    let mut stores = Vec::with_capacity(STORES.len());
    for name in STORES {
        stores.push(db.catalog().insert_store(name).await?);
    }

    let stock = db.stock();
    for seed in 0..args.products {
        let (code, base_price, names) = CATEGORIES[seed % CATEGORIES.len()];
        let turn = seed / CATEGORIES.len();
        let name = names[turn % names.len()];
        let display = match turn / names.len() {
            0 => name.to_string(),
            round => format!("{} #{}", name, round + 1),
        };
        let price = base_price + ((seed * 37) % 30) as i64 * 10;

        let product = db
            .catalog()
            .insert_product(
                &NewProduct::new(format!("{}-{:05}", code, seed), display, price)
                    .with_barcode(barcode_for(seed)),
            )
            .await?;

        for (store_idx, store) in stores.iter().enumerate() {
            let quantity = ((seed * 13 + store_idx * 7) % 60) as i64;
            stock.set_absolute(store.id, product.id, quantity).await?;
            stock.set_threshold(store.id, product.id, 5).await?;
        }

        if (seed + 1) % 100 == 0 {
            info!(generated = seed + 1, "Generating products");
        }
    }

    let tickets = db.tickets();
    let mut issued = 0;
    for member_id in MEMBER_IDS {
        for (ticket_type, uses, valid_days) in TICKETS {
            tickets
                .issue(*member_id, ticket_type, *uses, Utc::now() + Duration::days(*valid_days))
                .await?;
            issued += 1;
        }
    }

    info!(
        stores = stores.len(),
        products = args.products,
        tickets = issued,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Seed complete"
    );

    db.close().await;
    Ok(())
}

/// 13-digit barcode in a private-use prefix range.
fn barcode_for(seed: usize) -> String {
    format!("200{:010}", seed)
}
