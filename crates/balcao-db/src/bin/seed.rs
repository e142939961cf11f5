//! # Seed Data Generator
//!
//! Populates a database with demo data for development.
//!
//! ## Usage
//! ```bash
//! # Seed the default database file (./balcao.db)
//! cargo run -p balcao-db --bin seed
//!
//! # Specify database path
//! cargo run -p balcao-db --bin seed -- --db ./data/balcao.db
//! ```
//!
//! ## Generated Data
//! - A small catalog of corner-store products with stock levels
//! - An open cash session with an opening balance
//! - One settled demo sale so reports have something to show

use std::env;

use chrono::Utc;
use uuid::Uuid;

use balcao_core::{PaymentInfo, PaymentMethod, Product};
use balcao_db::{Database, DbConfig, SettlementConfig};

/// (sku, name, price in cents, stock, minimum)
const CATALOG: &[(&str, &str, i64, i64, i64)] = &[
    ("CAFE-500", "Cafe Torrado 500g", 1890, 40, 10),
    ("ACUCAR-1KG", "Acucar Cristal 1kg", 549, 60, 15),
    ("ARROZ-5KG", "Arroz Branco 5kg", 2790, 30, 8),
    ("FEIJAO-1KG", "Feijao Carioca 1kg", 899, 45, 10),
    ("LEITE-1L", "Leite Integral 1L", 479, 80, 24),
    ("GUARANA-2L", "Guarana 2L", 799, 50, 12),
    ("AGUA-500", "Agua Mineral 500ml", 250, 120, 36),
    ("BISC-REC", "Biscoito Recheado", 349, 70, 20),
    ("SABAO-PO", "Sabao em Po 800g", 1190, 25, 6),
    ("PAPEL-H4", "Papel Higienico 4un", 689, 35, 10),
];

#[tokio::main]
async fn main() {
    let db_path = parse_db_path().unwrap_or_else(|| "balcao.db".to_string());

    println!("Seeding database at {db_path}");

    let db = Database::new(DbConfig::new(&db_path))
        .await
        .expect("failed to open database");

    let inventory = db.inventory();
    let now = Utc::now();
    let mut first_product_id = None;

    for (sku, name, price, stock, minimum) in CATALOG {
        if inventory
            .get_by_sku(sku)
            .await
            .expect("failed to query product")
            .is_some()
        {
            println!("  {sku} already present, skipping");
            continue;
        }

        let product = Product {
            id: Uuid::new_v4().to_string(),
            sku: sku.to_string(),
            name: name.to_string(),
            unit_price_cents: *price,
            stock_on_hand: *stock,
            stock_minimum: *minimum,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        inventory.insert(&product).await.expect("failed to insert product");
        first_product_id.get_or_insert(product.id);
        println!("  + {sku} ({name}), stock {stock}");
    }

    // Open a cash session unless one is already open
    let cash = db.cash();
    let session = match cash.current_open().await.expect("failed to query session") {
        Some(session) => {
            println!("Cash session {} already open", session.id);
            session
        }
        None => {
            let session = cash
                .open("seed-operator", 20_000)
                .await
                .expect("failed to open cash session");
            println!("Opened cash session {} with R$200.00", session.id);
            session
        }
    };

    // Settle one demo sale so reports and listings have data
    if let Some(product_id) = first_product_id {
        let product = inventory
            .get_by_id(&product_id)
            .await
            .expect("failed to load product")
            .expect("seeded product missing");

        let orders = db.orders();
        let mut order = orders
            .create(Some("seed-customer"), Some("seed-operator"))
            .await
            .expect("failed to create order");
        order
            .add_line(&product, 2, product.unit_price_cents)
            .expect("failed to add line");
        orders.save(&order).await.expect("failed to save order");

        let payment = PaymentInfo::exact(PaymentMethod::Cash, order.total_cents());
        let sale = db
            .settlement(SettlementConfig::default())
            .finalize_order(&order.id, &payment)
            .await
            .expect("failed to settle demo sale");

        println!(
            "Settled demo sale {} for {} ({} x2)",
            sale.id,
            sale.total(),
            product.name
        );
    }

    let count = inventory.count().await.expect("failed to count products");
    let balance = cash
        .running_balance(&session.id)
        .await
        .expect("failed to compute balance");

    println!("Done: {count} products, session balance {balance} cents");
}

/// Parses `--db <path>` from the command line.
fn parse_db_path() -> Option<String> {
    let args: Vec<String> = env::args().collect();
    args.iter()
        .position(|a| a == "--db")
        .and_then(|i| args.get(i + 1))
        .cloned()
}
