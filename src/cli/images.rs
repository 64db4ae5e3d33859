use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::config::{CatalogRules, StorageConfig};
use crate::database_ops::db::Db;
use crate::images::tree::{copy_tree, scan_product_folders};
use crate::images::{ImageNormalizer, MagickDecoder, NormalizeReport, NormalizeSettings};
use crate::matching::FolderMatcher;

#[derive(Debug, Clone, Default)]
pub struct ImagePipelineConfig {
    /// Storage layout; defaults to `StorageConfig::from_env()`.
    pub storage: Option<StorageConfig>,
    /// Rules file for the category keywords (defaults to `CATALOG_RULES`).
    pub rules_path: Option<PathBuf>,
    /// Optional override for the MySQL connection string.
    pub database_url: Option<String>,
    /// Leave the existing photos as they are and only copy/scan/match.
    pub skip_normalize: bool,
    /// Compute assignments without writing them.
    pub dry_run: bool,
}

/// Normalize → copy to uploads → scan → match → persist.
pub async fn run(cfg: ImagePipelineConfig) -> Result<()> {
    let storage = cfg.storage.unwrap_or_else(StorageConfig::from_env);
    let rules = CatalogRules::load(cfg.rules_path.as_deref())?;

    if !storage.products_dir.is_dir() {
        bail!("products folder not found: {}", storage.products_dir.display());
    }

    let mut report = NormalizeReport::default();
    if cfg.skip_normalize {
        println!("\nSTEP 1: skipped (--skip-normalize)");
    } else {
        println!("\nSTEP 1: converting and optimizing images");
        let normalizer =
            ImageNormalizer::new(NormalizeSettings::from(&storage), MagickDecoder::default());
        report = normalizer
            .normalize_tree(&storage.products_dir)
            .with_context(|| format!("reading {}", storage.products_dir.display()))?;
    }

    println!("\nSTEP 2: preparing upload directory");
    let copied = copy_tree(&storage.products_dir, &storage.uploads_dir)?;
    println!("  copied {copied} files to {}", storage.uploads_dir.display());

    println!("\nSTEP 3: scanning product images");
    let folders = scan_product_folders(&storage.uploads_dir)?;
    println!("  found {} product folders with images", folders.len());

    println!("\nSTEP 4: matching folders to products");
    let db = Db::from_env(cfg.database_url.as_deref()).await?;
    let products = db.active_products().await?;
    let outcome = FolderMatcher::new(&rules.category_keywords).assign(
        &products,
        &folders,
        &storage.path_prefix,
    );
    info!(
        target = "pipeline",
        products = products.len(),
        matched = outcome.assignments.len(),
        unmatched = outcome.unmatched.len(),
        "matching complete"
    );

    if cfg.dry_run {
        for a in &outcome.assignments {
            println!(
                "  [dry-run] {} <- {} ({} images, score {})",
                a.product_name,
                a.folder_key,
                a.images.len(),
                a.score
            );
        }
    } else {
        let persisted = db.persist_assignments(&outcome.assignments).await;
        for a in &outcome.assignments {
            println!("  {}: {} images", a.product_name, a.images.len());
        }
        println!(
            "\n  updated {} products ({} failed, {} without a folder)",
            persisted.updated,
            persisted.failed,
            outcome.unmatched.len()
        );
    }

    let stats = db.image_stats().await?;
    println!("  products with images: {}", stats.products_with_images);
    println!("  total images: {}", stats.total_images);

    print_summary(&report);
    Ok(())
}

fn print_summary(report: &NormalizeReport) {
    println!("\nFINAL SUMMARY");
    println!("  HEIC files converted: {}", report.converted_heic);
    println!("  images optimized: {}", report.optimized);
    println!("  images resized: {}", report.resized);
    println!("  failed: {}", report.failed);
    println!("  storage before: {}", format_mb(report.bytes_before));
    println!("  storage after: {}", format_mb(report.bytes_after));
    if let Some(pct) = report.saved_percent() {
        let saved = report.saved_bytes();
        let sign = if saved < 0 { "-" } else { "" };
        println!("  saved: {sign}{} ({pct:.1}%)", format_mb(saved.unsigned_abs()));
    }
}

pub(crate) fn format_mb(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}
