use std::path::PathBuf;

use anyhow::Result;

use super::products::print_outcomes;
use crate::config::CatalogRules;
use crate::database_ops::db::Db;

#[derive(Debug, Clone, Default)]
pub struct ActivateConfig {
    pub rules_path: Option<PathBuf>,
    pub database_url: Option<String>,
}

/// Fill default prices, stock and sizes where missing, activate imaged products
/// and print the readiness summary.
pub async fn run(cfg: ActivateConfig) -> Result<()> {
    let rules = CatalogRules::load(cfg.rules_path.as_deref())?;
    let db = Db::from_env(cfg.database_url.as_deref()).await?;

    println!("=== Activating Products & Setting Defaults ===\n");
    let report = db.activate_products(&rules).await?;

    println!("default prices (only where price = 0):");
    print_outcomes(&report.prices, "");
    if report.default_stock > 0 {
        println!(
            "set default stock ({} units) for {} product(s)",
            rules.default_stock, report.default_stock
        );
    }
    println!("\ndefault sizes (only where none are set):");
    print_outcomes(&report.sizes, "");
    println!("activated {} product(s)", report.activated);

    let s = report.summary;
    println!("\n=== Summary ===");
    println!("Total Products: {}", s.total);
    println!("Active: {}", s.active);
    println!("With Prices: {}", s.with_price);
    println!("With Stock: {}", s.with_stock);
    Ok(())
}
