use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use super::images::format_mb;
use crate::config::StorageConfig;
use crate::images::tree::{count_images, lowercase_folders};
use crate::images::{ImageNormalizer, MagickDecoder, NormalizeSettings};

/// Image census of a tree (defaults to the uploads dir).
pub fn scan_images(root: Option<PathBuf>) -> Result<()> {
    let root = root.unwrap_or_else(|| StorageConfig::from_env().uploads_dir);
    if !root.is_dir() {
        bail!("directory not found: {}", root.display());
    }
    let census = count_images(&root)?;
    println!("\nscanning {}\n", root.display());
    for (folder, count) in &census.folders {
        println!("  {folder}: {count} images");
    }
    println!("\ntotal images: {} in {} folders", census.total_images, census.folders.len());
    Ok(())
}

/// Tree renamed by `lowercase` when no path is given. The products tree is
/// the source `copy_tree` mirrors into uploads, so renaming only the uploads
/// copy would bring the mixed-case folders back on the next pipeline run.
pub fn lowercase_root(root: Option<PathBuf>, storage: &StorageConfig) -> PathBuf {
    root.unwrap_or_else(|| storage.products_dir.clone())
}

/// Lower-case every directory name below `root` (defaults to the products dir).
pub fn lowercase(root: Option<PathBuf>) -> Result<()> {
    let root = lowercase_root(root, &StorageConfig::from_env());
    if !root.is_dir() {
        bail!("directory not found: {}", root.display());
    }
    let report = lowercase_folders(&root)?;
    println!(
        "renamed {}, skipped {}, failed {}",
        report.renamed, report.skipped, report.failed
    );
    if report.failed > 0 {
        bail!("{} folders could not be renamed", report.failed);
    }
    Ok(())
}

/// Run only the normalization pass over `root` (defaults to the products dir).
pub fn normalize(root: Option<PathBuf>) -> Result<()> {
    let storage = StorageConfig::from_env();
    let root = root.unwrap_or_else(|| storage.products_dir.clone());
    let normalizer =
        ImageNormalizer::new(NormalizeSettings::from(&storage), MagickDecoder::default());
    let report = normalizer
        .normalize_tree(&root)
        .with_context(|| format!("reading {}", root.display()))?;
    println!(
        "converted {} HEIC, optimized {}, resized {}, failed {}",
        report.converted_heic, report.optimized, report.resized, report.failed
    );
    println!(
        "storage {} -> {}",
        format_mb(report.bytes_before),
        format_mb(report.bytes_after)
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::tree::{copy_tree, scan_product_folders};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn lowercase_defaults_to_products_tree() {
        let storage = StorageConfig::default();
        assert_eq!(lowercase_root(None, &storage), storage.products_dir);
        assert_eq!(
            lowercase_root(Some(PathBuf::from("elsewhere")), &storage),
            PathBuf::from("elsewhere")
        );
    }

    #[test]
    fn urls_stay_valid_after_lowercasing_source_and_recopying() {
        let tmp = TempDir::new().unwrap();
        let products = tmp.path().join("products");
        let uploads = tmp.path().join("uploads");
        touch(&products, "Boys/Cantex Junior Boxer/a.jpg");

        lowercase(Some(products.clone())).unwrap();
        copy_tree(&products, &uploads).unwrap();
        touch(&products, "boys/cantex junior boxer/b.jpg");
        copy_tree(&products, &uploads).unwrap();

        let folders = scan_product_folders(&uploads).unwrap();
        let urls: Vec<String> = folders
            .values()
            .flat_map(|f| f.image_urls(""))
            .collect();
        assert_eq!(urls.len(), 2);
        for url in urls {
            assert!(uploads.join(url.trim_start_matches('/')).is_file(), "{url} missing");
        }
    }
}
