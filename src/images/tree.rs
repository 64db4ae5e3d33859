//! Folder-tree utilities for the product photo storage.
//!
//! A *product folder* is any directory that directly contains image files. The
//! tree layout is `category/[subcategory/...]/product/<images>`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Extensions picked up when building the folder → images map.
pub const UPLOAD_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];
/// Extensions counted by the storage census.
pub const CENSUS_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductFolder {
    /// Slash-separated path relative to the scan root, casing as found on disk.
    pub relative_path: String,
    /// Image file names in name order.
    pub images: Vec<String>,
}

impl ProductFolder {
    /// Lower-cased relative path; unique per scan and used as the claim key.
    pub fn key(&self) -> String {
        self.relative_path.to_lowercase()
    }

    /// Last path segment, lower-cased.
    pub fn folder_name(&self) -> String {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_lowercase()
    }

    /// First path segment, lower-cased; empty when the folder sits at the top level.
    pub fn category(&self) -> String {
        match self.relative_path.split_once('/') {
            Some((first, _)) => first.to_lowercase(),
            None => String::new(),
        }
    }

    /// Public URLs for every image, `<prefix>/<lower-cased folder>/<file name>`.
    pub fn image_urls(&self, prefix: &str) -> Vec<String> {
        let prefix = prefix.trim_end_matches('/');
        let key = self.key();
        self.images
            .iter()
            .map(|name| format!("{prefix}/{key}/{name}"))
            .collect()
    }
}

pub fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| allowed.iter().any(|a| e.eq_ignore_ascii_case(a)))
        .unwrap_or(false)
}

/// Children of `dir` split into (files, directories), each sorted by name.
fn sorted_children(dir: &Path) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut files = Vec::new();
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            dirs.push(entry.path());
        } else if file_type.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    dirs.sort();
    Ok((files, dirs))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Walk `root` and return every product folder keyed by its lower-cased relative
/// path, in depth-first name order. Images directly under `root` are ignored
/// since they cannot belong to a product.
pub fn scan_product_folders(root: &Path) -> Result<IndexMap<String, ProductFolder>> {
    let mut out = IndexMap::new();
    scan_dir(root, "", &mut out)?;
    info!(target = "scan", root = %root.display(), folders = out.len(), "scanned product folders");
    Ok(out)
}

fn scan_dir(dir: &Path, relative: &str, out: &mut IndexMap<String, ProductFolder>) -> Result<()> {
    let (files, dirs) = sorted_children(dir)?;
    let images: Vec<String> = files
        .iter()
        .filter(|p| has_extension(p, UPLOAD_EXTENSIONS))
        .map(|p| file_name(p))
        .collect();

    if !images.is_empty() {
        if relative.is_empty() {
            warn!(target = "scan", count = images.len(), "images at storage root ignored");
        } else {
            let folder = ProductFolder {
                relative_path: relative.to_string(),
                images,
            };
            let key = folder.key();
            if out.contains_key(&key) {
                warn!(target = "scan", folder = %relative, "folder differs only by case; keeping first");
            } else {
                out.insert(key, folder);
            }
        }
    }

    for sub in dirs {
        let name = file_name(&sub);
        let child = if relative.is_empty() {
            name
        } else {
            format!("{relative}/{name}")
        };
        scan_dir(&sub, &child, out)?;
    }
    Ok(())
}

/// Recursively copy `src` into `dest`, overwriting existing files.
/// Returns the number of files copied.
pub fn copy_tree(src: &Path, dest: &Path) -> Result<u64> {
    fs::create_dir_all(dest).with_context(|| format!("creating {}", dest.display()))?;
    let mut copied = 0u64;
    for entry in WalkDir::new(src).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let rel = entry.path().strip_prefix(src)?;
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("creating {}", target.display()))?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target).with_context(|| {
                format!("copying {} -> {}", entry.path().display(), target.display())
            })?;
            copied += 1;
        }
    }
    info!(target = "copy", files = copied, dest = %dest.display(), "tree copied");
    Ok(copied)
}

/// Image count per folder below a root.
#[derive(Debug, Clone, Default)]
pub struct ImageCensus {
    /// (relative folder, image count); the root itself is reported as `root`.
    pub folders: Vec<(String, usize)>,
    pub total_images: usize,
}

pub fn count_images(root: &Path) -> Result<ImageCensus> {
    let mut census = ImageCensus::default();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let (files, _) = sorted_children(entry.path())?;
        let count = files
            .iter()
            .filter(|p| has_extension(p, CENSUS_EXTENSIONS))
            .count();
        if count == 0 {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)?
            .to_string_lossy()
            .replace('\\', "/");
        let label = if rel.is_empty() { "root".to_string() } else { rel };
        census.total_images += count;
        census.folders.push((label, count));
    }
    Ok(census)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LowercaseReport {
    pub renamed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Rename every directory below `root` to its lower-case name.
///
/// Deepest directories go first so parent renames never invalidate pending
/// paths. Renames go through a temporary name so case-only changes also work on
/// case-insensitive filesystems. A directory is skipped when a *different*
/// sibling already uses the lower-case name.
pub fn lowercase_folders(root: &Path) -> Result<LowercaseReport> {
    let mut dirs: Vec<(usize, PathBuf)> = Vec::new();
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry?;
        if entry.file_type().is_dir() {
            dirs.push((entry.depth(), entry.into_path()));
        }
    }
    dirs.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    let mut report = LowercaseReport::default();
    for (seq, (_, dir)) in dirs.iter().enumerate() {
        let base = file_name(dir);
        let lower = base.to_lowercase();
        if lower == base {
            continue;
        }
        let Some(parent) = dir.parent() else {
            continue;
        };
        if sibling_exists(parent, &lower)? {
            info!(target = "lowercase", dir = %dir.display(), "skip: target exists");
            report.skipped += 1;
            continue;
        }
        let tmp = parent.join(format!("_tmp_{}_{seq}", std::process::id()));
        let target = parent.join(&lower);
        let renamed = fs::rename(dir, &tmp).and_then(|_| fs::rename(&tmp, &target));
        match renamed {
            Ok(()) => {
                debug!(target = "lowercase", from = %dir.display(), to = %target.display(), "renamed");
                report.renamed += 1;
            }
            Err(err) => {
                warn!(target = "lowercase", dir = %dir.display(), error = %err, "rename failed");
                if tmp.exists() {
                    let _ = fs::rename(&tmp, dir);
                }
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

/// Whether `parent` has an entry spelled exactly `name`.
fn sibling_exists(parent: &Path, name: &str) -> Result<bool> {
    for entry in fs::read_dir(parent)? {
        if entry?.file_name().to_string_lossy() == name {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn scan_builds_folder_map_with_urls() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "Boys/Cantex Junior Boxer/b.png");
        touch(tmp.path(), "Boys/Cantex Junior Boxer/a.jpg");
        touch(tmp.path(), "Boys/Cantex Junior Boxer/notes.txt");
        touch(tmp.path(), "Mens/Underwear/Classic/IMG_0431.PNG");
        touch(tmp.path(), "stray.jpg");

        let folders = scan_product_folders(tmp.path()).unwrap();
        let keys: Vec<&str> = folders.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["boys/cantex junior boxer", "mens/underwear/classic"]);

        let boxer = &folders["boys/cantex junior boxer"];
        assert_eq!(boxer.category(), "boys");
        assert_eq!(boxer.folder_name(), "cantex junior boxer");
        assert_eq!(
            boxer.image_urls("/storage/uploads/products/"),
            vec![
                "/storage/uploads/products/boys/cantex junior boxer/a.jpg",
                "/storage/uploads/products/boys/cantex junior boxer/b.png",
            ]
        );
    }

    #[test]
    fn single_segment_folder_has_no_category() {
        let folder = ProductFolder {
            relative_path: "Vest".into(),
            images: vec!["1.jpg".into()],
        };
        assert_eq!(folder.category(), "");
        assert_eq!(folder.folder_name(), "vest");
    }

    #[test]
    fn copy_tree_mirrors_files() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        touch(src.path(), "girls/vest/1.jpg");
        touch(src.path(), "girls/vest/2.jpg");
        fs::create_dir_all(src.path().join("empty")).unwrap();

        let copied = copy_tree(src.path(), &dest.path().join("out")).unwrap();
        assert_eq!(copied, 2);
        assert!(dest.path().join("out/girls/vest/2.jpg").is_file());
        assert!(dest.path().join("out/empty").is_dir());
    }

    #[test]
    fn census_counts_per_folder() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "cover.gif");
        touch(tmp.path(), "women/vest/1.jpg");
        touch(tmp.path(), "women/vest/2.webp");

        let census = count_images(tmp.path()).unwrap();
        assert_eq!(census.total_images, 2);
        assert_eq!(
            census.folders,
            vec![("root".to_string(), 1), ("women/vest".to_string(), 1)]
        );
    }

    #[test]
    fn lowercases_nested_directories() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "Boys/Junior Brief/1.jpg");
        touch(tmp.path(), "girls/Vest/1.jpg");

        let report = lowercase_folders(tmp.path()).unwrap();
        assert_eq!(report.renamed, 3);
        assert_eq!(report.failed, 0);
        assert!(tmp.path().join("boys/junior brief/1.jpg").is_file());
        assert!(tmp.path().join("girls/vest/1.jpg").is_file());
    }

    #[test]
    fn lowercase_skips_when_lower_case_sibling_exists() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "Boys/Vest/1.jpg");
        touch(tmp.path(), "boys/brief/1.jpg");

        let report = lowercase_folders(tmp.path()).unwrap();
        assert_eq!(
            report,
            LowercaseReport {
                renamed: 1,
                skipped: 1,
                failed: 0
            }
        );
        assert!(tmp.path().join("Boys/vest/1.jpg").is_file());
        assert!(tmp.path().join("boys/brief/1.jpg").is_file());
    }
}
