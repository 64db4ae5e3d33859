use std::path::PathBuf;

use anyhow::Result;

use crate::config::{CatalogRules, StorageConfig};
use crate::database_ops::db::Db;
use crate::database_ops::reports::active_image_lists;
use crate::images::tree::scan_product_folders;
use crate::matching::{exact_name_misses, CatalogProduct, FolderMatcher};

#[derive(Debug, Clone, Default)]
pub struct DebugMatchingConfig {
    pub storage: Option<StorageConfig>,
    pub rules_path: Option<PathBuf>,
    pub database_url: Option<String>,
}

/// Read-only view of what the image pipeline would do against the uploads tree.
pub async fn run(cfg: DebugMatchingConfig) -> Result<()> {
    let storage = cfg.storage.unwrap_or_else(StorageConfig::from_env);
    let rules = CatalogRules::load(cfg.rules_path.as_deref())?;

    let folders = scan_product_folders(&storage.uploads_dir)?;
    println!("\nstorage folders with images: {}", folders.len());
    for f in folders.values() {
        println!("   - {} ({} images)", f.relative_path, f.images.len());
    }

    let db = Db::from_env(cfg.database_url.as_deref()).await?;
    let rows = active_image_lists(&db).await?;
    println!("\ndatabase products: {}", rows.len());

    let (with, without): (Vec<_>, Vec<_>) = rows.iter().partition(|r| !r.image_urls().is_empty());
    println!("\nproducts WITH images:");
    for r in &with {
        println!("   - {} ({} images)", r.name, r.image_urls().len());
    }
    println!("\nproducts WITHOUT images:");
    for r in &without {
        println!("   - {}", r.name);
    }

    let imageless: Vec<CatalogProduct> = without
        .iter()
        .map(|r| CatalogProduct::new(r.id.clone(), r.name.clone()))
        .collect();
    println!("\nno folder with the same name:");
    for p in exact_name_misses(&imageless, &folders) {
        println!("   ! {}", p.name);
    }

    // Same order the pipeline sees, so contested folders resolve identically.
    let products = db.active_products().await?;
    let outcome = FolderMatcher::new(&rules.category_keywords).assign(
        &products,
        &folders,
        &storage.path_prefix,
    );
    println!("\nmatcher dry run:");
    for a in &outcome.assignments {
        println!("   {:>3}  {} -> {}", a.score, a.product_name, a.folder_key);
    }
    for p in &outcome.unmatched {
        println!("   ---  {} -> (no folder)", p.name);
    }
    Ok(())
}
