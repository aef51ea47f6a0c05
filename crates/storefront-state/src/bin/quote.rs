//! # quote
//!
//! Prices a cart from a JSON request file against an in-memory catalog.
//!
//! ```text
//! quote <request.json> [config.toml]
//!
//! {
//!   "catalog": [ { "id": 1, "name": "Tile Saw", "price": "300", "rental_price": "45" } ],
//!   "lines": [
//!     { "product_id": "1", "quantity": 1,
//!       "rental": { "start_date": "2026-03-01", "end_date": "2026-03-04" } }
//!   ]
//! }
//! ```
//!
//! ## Log Levels
//! - `RUST_LOG=debug` - Show cache and fetch decisions
//! - Default: `info,storefront=debug`

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use storefront_core::lenient;
use storefront_state::{DataService, InMemoryApi, ServiceConfig, StateManager};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
struct QuoteRequest {
    #[serde(default)]
    catalog: Vec<Value>,
    lines: Vec<QuoteLine>,
}

#[derive(Debug, Deserialize)]
struct QuoteLine {
    #[serde(deserialize_with = "lenient::id")]
    product_id: String,
    #[serde(default = "one")]
    quantity: i64,
    #[serde(default)]
    rental: Option<storefront_core::RentalRange>,
}

fn one() -> i64 {
    1
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,storefront=debug"));

    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let request_path = args.next().ok_or("usage: quote <request.json> [config.toml]")?;
    let config = ServiceConfig::load_or_default(args.next().map(PathBuf::from));

    let request: QuoteRequest = serde_json::from_str(&std::fs::read_to_string(&request_path)?)?;
    info!(path = %request_path, products = request.catalog.len(), lines = request.lines.len(), "Quote request loaded");

    let api = Arc::new(InMemoryApi::with_products(request.catalog));
    let service = DataService::new(api, StateManager::new(), config);

    for line in request.lines {
        let product = service.get_product(&line.product_id, false).await?;
        let is_rental = line.rental.is_some();
        service.add_to_cart(product, line.quantity, is_rental, line.rental)?;
    }

    let cart = service.get_cart()?;
    for item in cart.items() {
        let mode = match item.rental_days() {
            Some(days) => format!("rent {days}d"),
            None if item.is_rental => "rent".to_string(),
            None => "buy".to_string(),
        };
        println!(
            "{:<8} {:<32} x{:<4} {:>8} {:>12}",
            item.product.id,
            item.product.name,
            item.quantity,
            mode,
            item.subtotal.to_string()
        );
    }
    println!("{:<8} {:<32} {:>27}", "", "TOTAL", cart.total().to_string());

    Ok(())
}
