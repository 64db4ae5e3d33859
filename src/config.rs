//! Storage locations and the rule tables that drive matching and bulk updates.
//!
//! Everything that used to be a literal in the maintenance scripts (LIKE
//! patterns, prices, size ladders, category keywords) lives in [`CatalogRules`]
//! so it can be swapped with a JSON file instead of edited in code.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bigdecimal::BigDecimal;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::util::env::{env_opt, env_parse};

pub const DEFAULT_PRODUCTS_DIR: &str = "storage/products";
pub const DEFAULT_UPLOADS_DIR: &str = "storage/uploads/products";
pub const DEFAULT_PATH_PREFIX: &str = "/storage/uploads/products";
pub const DEFAULT_MAX_DIMENSION: u32 = 1200;
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Where the photo trees live and how normalized images are encoded.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Raw product photos, organised `category/.../product/<images>`.
    pub products_dir: PathBuf,
    /// Web-served copy of `products_dir`; scanned for the DB update.
    pub uploads_dir: PathBuf,
    /// URL prefix prepended to every stored image path.
    pub path_prefix: String,
    pub max_dimension: u32,
    pub jpeg_quality: u8,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            products_dir: PathBuf::from(DEFAULT_PRODUCTS_DIR),
            uploads_dir: PathBuf::from(DEFAULT_UPLOADS_DIR),
            path_prefix: DEFAULT_PATH_PREFIX.to_string(),
            max_dimension: DEFAULT_MAX_DIMENSION,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl StorageConfig {
    /// Defaults overridden by `PRODUCTS_DIR`, `UPLOADS_DIR`, `IMAGE_PATH_PREFIX`,
    /// `MAX_DIMENSION` and `JPEG_QUALITY`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            products_dir: env_opt("PRODUCTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.products_dir),
            uploads_dir: env_opt("UPLOADS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.uploads_dir),
            path_prefix: env_opt("IMAGE_PATH_PREFIX").unwrap_or(defaults.path_prefix),
            max_dimension: env_parse("MAX_DIMENSION", defaults.max_dimension).max(1),
            jpeg_quality: env_parse("JPEG_QUALITY", defaults.jpeg_quality).clamp(1, 100),
        }
    }
}

/// A product-name keyword that implies the folder's top-level category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryKeyword {
    /// Substring looked up in the normalized (lower-case) product name.
    pub keyword: String,
    /// Category segment (first path component) the keyword points at.
    pub category: String,
}

impl CategoryKeyword {
    pub fn new(keyword: &str, category: &str) -> Self {
        Self {
            keyword: keyword.to_lowercase(),
            category: category.to_lowercase(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogRules {
    pub category_keywords: Vec<CategoryKeyword>,
    /// Name pattern → price, applied unconditionally (`name LIKE %pattern%`).
    pub prices: IndexMap<String, BigDecimal>,
    /// Name pattern → price, applied only to products still priced at zero.
    pub default_prices: IndexMap<String, BigDecimal>,
    /// Name pattern → stock quantity.
    pub stock: IndexMap<String, i32>,
    /// Stock given to imaged products that still have none.
    pub default_stock: i32,
    /// Name pattern → size ladder.
    pub sizes: IndexMap<String, Vec<String>>,
}

impl Default for CatalogRules {
    fn default() -> Self {
        let category_keywords = vec![
            CategoryKeyword::new("boys", "boys"),
            CategoryKeyword::new("girls", "girls"),
            CategoryKeyword::new("mens", "mens"),
            CategoryKeyword::new("cantex mens", "mens"),
            CategoryKeyword::new("women", "women"),
        ];

        let prices = price_table(&[
            ("Boys Cantex Junior Boxer", 299),
            ("Boys Junior Brief", 249),
            ("Boys Pants", 399),
            ("Boys Vest", 349),
            ("Girls Panties", 249),
            ("Girls Vest", 349),
            ("Mens Underwear Apple", 399),
            ("Mens Underwear Classic", 399),
            ("Mens Underwear Short Boxer", 499),
            ("Mens Underwear Long boxer", 599),
            ("Mens Pants", 599),
            ("Mens Ultimate", 799),
            ("Mens Vest", 399),
            ("Women Panties", 299),
            ("Women Vest", 399),
        ]);

        let default_prices = price_table(&[
            ("Boys", 299),
            ("Girls", 249),
            ("Mens Underwear", 399),
            ("Mens Pants", 599),
            ("Mens Ultimate", 799),
            ("Mens Vest", 399),
            ("Women Panties", 299),
            ("Women Vest", 399),
        ]);

        let stock = [("Boys", 50), ("Girls", 40), ("Mens", 60), ("Women", 55)]
            .into_iter()
            .map(|(p, q)| (p.to_string(), q))
            .collect();

        let sizes = [
            ("Underwear", &["XS", "S", "M", "L", "XL", "XXL"][..]),
            ("Panties", &["S", "M", "L", "XL"][..]),
            ("Pants", &["26", "28", "30", "32", "34", "36"][..]),
            ("Vest", &["S", "M", "L", "XL"][..]),
        ]
        .into_iter()
        .map(|(p, ladder)| (p.to_string(), ladder.iter().map(|s| s.to_string()).collect()))
        .collect();

        Self {
            category_keywords,
            prices,
            default_prices,
            stock,
            default_stock: 50,
            sizes,
        }
    }
}

fn price_table(entries: &[(&str, i64)]) -> IndexMap<String, BigDecimal> {
    entries
        .iter()
        .map(|(pattern, price)| (pattern.to_string(), BigDecimal::from(*price)))
        .collect()
}

impl CatalogRules {
    /// Load rules from `path`, or from `CATALOG_RULES` when no path is given.
    /// Falls back to the built-in tables when neither is set. Keys missing from
    /// the file keep their built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| env_opt("CATALOG_RULES").map(PathBuf::from));
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("reading rules file {}", path.display()))?;
        let mut rules: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing rules file {}", path.display()))?;
        for kw in &mut rules.category_keywords {
            *kw = CategoryKeyword::new(&kw.keyword, &kw.category);
        }
        info!(target = "config", path = %path.display(), "loaded catalog rules");
        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_rule_order() {
        let rules = CatalogRules::default();
        let first = rules.prices.keys().next().map(String::as_str);
        assert_eq!(first, Some("Boys Cantex Junior Boxer"));
        assert_eq!(rules.default_stock, 50);
        assert_eq!(rules.sizes["Vest"], vec!["S", "M", "L", "XL"]);
        assert!(rules
            .category_keywords
            .contains(&CategoryKeyword::new("cantex mens", "mens")));
    }

    #[test]
    fn partial_rules_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        fs::write(
            &path,
            r#"{"category_keywords":[{"keyword":"Kids","category":"Kids"}],"default_stock":12}"#,
        )
        .unwrap();

        let rules = CatalogRules::load(Some(&path)).unwrap();
        assert_eq!(rules.category_keywords, vec![CategoryKeyword::new("kids", "kids")]);
        assert_eq!(rules.default_stock, 12);
        assert_eq!(rules.prices.len(), CatalogRules::default().prices.len());
    }

    #[test]
    fn malformed_rules_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(CatalogRules::load(Some(&path)).is_err());
    }
}
