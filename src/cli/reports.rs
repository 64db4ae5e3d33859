use anyhow::Result;

use super::{center, rule, yes_no};
use crate::config::StorageConfig;
use crate::database_ops::db::Db;
use crate::database_ops::reports::{
    database_overview, import_overview, listing_summary, parse_image_list, product_listing,
    products_with_images, products_without_images,
};
use crate::images::tree::count_images;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportKind {
    /// Imaged products with price, stock, image count and summary totals.
    #[default]
    Products,
    /// First N products with and without images.
    Images,
    /// Current database, totals and one sample product.
    Database,
    /// Imported products, files on disk and active categories.
    Import,
}

#[derive(Debug, Clone, Default)]
pub struct ReportsConfig {
    pub kind: ReportKind,
    /// Row limit for the image check (defaults to 10).
    pub limit: Option<i64>,
    pub database_url: Option<String>,
}

pub async fn run(cfg: ReportsConfig) -> Result<()> {
    let db = Db::from_env(cfg.database_url.as_deref()).await?;
    match cfg.kind {
        ReportKind::Products => show_products(&db).await,
        ReportKind::Images => check_images(&db, cfg.limit.unwrap_or(10).max(1)).await,
        ReportKind::Database => check_db(&db).await,
        ReportKind::Import => verify_import(&db).await,
    }
}

async fn show_products(db: &Db) -> Result<()> {
    let rows = product_listing(db).await?;
    println!("\n{}", rule('=', 100));
    println!("{}", center("PRODUCTS AND IMAGES", 100));
    println!("{}\n", rule('=', 100));
    println!("Total Products: {}\n", rows.len());
    println!(
        "{:<45} | {:<9} | {:<7} | {:<8} | {:<8}",
        "Product Name", "Price", "Stock", "Images", "Active"
    );
    println!("{}", rule('-', 100));
    for r in &rows {
        let stock = r.stock_quantity.map(|s| s.to_string()).unwrap_or_else(|| "-".into());
        println!(
            "{:<45} | {:<9} | {:<7} | {:<8} | {:<8}",
            r.name,
            r.price.with_scale(0).to_string(),
            stock,
            r.image_count,
            yes_no(r.is_active != 0)
        );
    }
    println!("{}", rule('-', 100));

    let s = listing_summary(db).await?;
    println!("\nTotal Products: {}", s.total);
    println!("Active Products: {}", s.active);
    println!("Total Stock: {} units", s.total_stock);
    println!("Total Images: {}", s.total_images);
    match &s.avg_price {
        Some(avg) => println!("Average Price: {}", avg.with_scale(0)),
        None => println!("Average Price: -"),
    }

    let storage = StorageConfig::from_env();
    println!("\nImages are served from {}/<category>/<product>/<file>", storage.path_prefix.trim_end_matches('/'));
    if let Ok(census) = count_images(&storage.uploads_dir) {
        println!("Files under {}: {}", storage.uploads_dir.display(), census.total_images);
    }
    Ok(())
}

async fn check_images(db: &Db, limit: i64) -> Result<()> {
    println!("\n=== Products with Images (first {limit}) ===\n");
    for r in products_with_images(db, limit).await? {
        println!(
            "{:<40} | Active: {:<3} | Images: {}",
            r.name,
            yes_no(r.is_active != 0),
            r.image_urls().len()
        );
    }

    println!("\n=== Products without Images (first {limit}) ===\n");
    for r in products_without_images(db, limit).await? {
        println!("{:<40} | Active: {:<3} | Images: 0", r.name, yes_no(r.is_active != 0));
    }
    Ok(())
}

async fn check_db(db: &Db) -> Result<()> {
    let o = database_overview(db).await?;
    println!("\n=== Database Verification ===\n");
    println!("Connected to database: {}", o.database.as_deref().unwrap_or("(none)"));
    println!("Total products in table: {}", o.total);
    println!("Products with images: {}", o.with_images);
    println!("Active products: {}", o.active);

    if let Some(sample) = o.sample {
        let images = parse_image_list(sample.images.as_deref());
        println!("\nSample Product:");
        println!("  ID: {}", sample.id);
        println!("  Name: {}", sample.name);
        println!("  Slug: {}", sample.slug.as_deref().unwrap_or("-"));
        println!("  Price: {}", sample.price);
        println!("  Active: {}", yes_no(sample.is_active != 0));
        println!("  Image Count: {}", images.len());
        if let Some(first) = images.first() {
            println!("  First Image: {first}");
        }
    }
    Ok(())
}

async fn verify_import(db: &Db) -> Result<()> {
    let o = import_overview(db).await?;
    println!("=== Product Import Verification ===\n");
    println!("Total products imported: {}\n", o.with_images);
    println!("Sample Products:");
    println!("{}", rule('-', 100));
    for (idx, p) in o.samples.iter().enumerate() {
        let images = parse_image_list(p.images.as_deref());
        println!("\n{}. {}", idx + 1, p.name);
        println!("   Product ID: {}", p.id);
        println!("   Category ID: {}", p.category_id.as_deref().unwrap_or("-"));
        println!("   Images: {}", images.len());
        if let Some(first) = images.first() {
            println!("   Sample image: {first}");
        }
    }

    let storage = StorageConfig::from_env();
    if storage.uploads_dir.is_dir() {
        let census = count_images(&storage.uploads_dir)?;
        println!("\n\nTotal image files: {}", census.total_images);
        println!("Image directory: {}", storage.uploads_dir.display());
    } else {
        println!("\nImage directory not found: {}", storage.uploads_dir.display());
    }

    println!("\n\nTotal categories: {}", o.categories.len());
    for c in &o.categories {
        match &c.parent_id {
            Some(parent) => println!("  - {} (sub-category of {parent})", c.name),
            None => println!("  - {} (main)", c.name),
        }
    }
    Ok(())
}
