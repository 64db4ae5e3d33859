use std::path::PathBuf;

use anyhow::Result;

use super::{rule, truncate_chars};
use crate::config::CatalogRules;
use crate::database_ops::bulk::RuleOutcome;
use crate::database_ops::db::Db;
use crate::database_ops::reports::price_listing;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProductsAction {
    /// Print name, price, stock and description of imaged products.
    #[default]
    View,
    /// Overwrite prices from the rules table.
    Prices,
    /// Overwrite stock quantities from the rules table.
    Stock,
    /// Overwrite size ladders from the rules table.
    Sizes,
    /// Activate every product that has images.
    Activate,
}

#[derive(Debug, Clone, Default)]
pub struct ProductsConfig {
    pub action: ProductsAction,
    pub rules_path: Option<PathBuf>,
    pub database_url: Option<String>,
}

pub async fn run(cfg: ProductsConfig) -> Result<()> {
    let rules = CatalogRules::load(cfg.rules_path.as_deref())?;
    let db = Db::from_env(cfg.database_url.as_deref()).await?;

    match cfg.action {
        ProductsAction::View => view(&db).await?,
        ProductsAction::Prices => {
            println!("\n=== Bulk Update Product Prices ===\n");
            print_outcomes(&db.apply_prices(&rules.prices, false).await, "");
            view(&db).await?;
        }
        ProductsAction::Stock => {
            println!("\n=== Bulk Update Stock Quantities ===\n");
            print_outcomes(&db.apply_stock(&rules.stock).await, " units");
        }
        ProductsAction::Sizes => {
            println!("\n=== Add Product Sizes ===\n");
            print_outcomes(&db.apply_sizes(&rules.sizes, false).await?, "");
        }
        ProductsAction::Activate => {
            let activated = db.activate_with_images().await?;
            println!("activated {activated} products");
        }
    }
    Ok(())
}

pub(crate) fn print_outcomes(outcomes: &[RuleOutcome], unit: &str) {
    let mut total = 0;
    for o in outcomes.iter().filter(|o| o.rows > 0) {
        println!("  updated {} product(s): {} -> {}{unit}", o.rows, o.pattern, o.value);
        total += o.rows;
    }
    println!("\n  {total} rows changed by {} rules", outcomes.len());
}

async fn view(db: &Db) -> Result<()> {
    let rows = price_listing(db).await?;
    println!("{}", rule('=', 140));
    println!(
        "{:<40} | {:<9} | {:<6} | {:<80}",
        "Product Name", "Price", "Stock", "Description"
    );
    println!("{}", rule('=', 140));
    for r in &rows {
        let stock = r.stock_quantity.map(|s| s.to_string()).unwrap_or_else(|| "-".into());
        let desc = r
            .description
            .as_deref()
            .filter(|d| !d.is_empty())
            .map(|d| truncate_chars(d, 80))
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<40} | {:<9} | {:<6} | {:<80}",
            r.name,
            r.price.with_scale(2).to_string(),
            stock,
            desc
        );
    }
    println!("{}", rule('=', 140));
    Ok(())
}
