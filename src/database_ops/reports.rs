//! Read-only catalog reports.
//!
//! Column types are normalized in SQL (`CAST ... AS SIGNED/CHAR/DECIMAL`) so the
//! rows decode the same regardless of how a given schema declares ids, flags
//! and JSON columns.

use anyhow::Result;
use bigdecimal::BigDecimal;
use sqlx::FromRow;
use tracing::warn;

use super::catalog::HAS_IMAGES;
use crate::database_ops::db::Db;

#[derive(Debug, Clone, FromRow)]
pub struct ProductListingRow {
    pub id: String,
    pub name: String,
    pub price: BigDecimal,
    pub stock_quantity: Option<i64>,
    pub image_count: i64,
    pub is_active: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct ListingSummary {
    pub total: i64,
    pub active: i64,
    pub total_stock: i64,
    pub total_images: i64,
    pub avg_price: Option<BigDecimal>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ImageCheckRow {
    pub id: String,
    pub name: String,
    pub is_active: i64,
    pub images: Option<String>,
}

impl ImageCheckRow {
    pub fn image_urls(&self) -> Vec<String> {
        parse_image_list(self.images.as_deref())
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SampleProduct {
    pub id: String,
    pub name: String,
    pub slug: Option<String>,
    pub price: BigDecimal,
    pub is_active: i64,
    pub images: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DatabaseOverview {
    pub database: Option<String>,
    pub total: i64,
    pub with_images: i64,
    pub active: i64,
    pub sample: Option<SampleProduct>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ImportedProduct {
    pub id: String,
    pub name: String,
    pub category_id: Option<String>,
    pub images: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct CategoryRow {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ImportOverview {
    pub with_images: i64,
    pub samples: Vec<ImportedProduct>,
    pub categories: Vec<CategoryRow>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PriceRow {
    pub name: String,
    pub price: BigDecimal,
    pub stock_quantity: Option<i64>,
    pub description: Option<String>,
}

/// Decode a stored image list; malformed JSON reads as empty.
pub fn parse_image_list(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return Vec::new();
    };
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(list) => list,
        Err(err) => {
            warn!(target = "reports", error = %err, "unparseable images column");
            Vec::new()
        }
    }
}

async fn count(db: &Db, sql: &str) -> Result<i64> {
    let n: i64 = sqlx::query_scalar(sql).fetch_one(&db.pool).await?;
    Ok(n)
}

/// Every product with images, by name.
pub async fn product_listing(db: &Db) -> Result<Vec<ProductListingRow>> {
    let q = format!(
        "SELECT CAST(id AS CHAR) AS id, name, \
                CAST(price AS DECIMAL(12,2)) AS price, \
                CAST(stock_quantity AS SIGNED) AS stock_quantity, \
                CAST(COALESCE(JSON_LENGTH(images), 0) AS SIGNED) AS image_count, \
                CAST(is_active AS SIGNED) AS is_active \
         FROM products WHERE {HAS_IMAGES} ORDER BY name"
    );
    Ok(sqlx::query_as::<_, ProductListingRow>(&q)
        .fetch_all(&db.pool)
        .await?)
}

pub async fn listing_summary(db: &Db) -> Result<ListingSummary> {
    let q = format!(
        "SELECT COUNT(*) AS total, \
                COUNT(CASE WHEN is_active = true THEN 1 END) AS active, \
                CAST(COALESCE(SUM(stock_quantity), 0) AS SIGNED) AS total_stock, \
                CAST(COALESCE(SUM(JSON_LENGTH(images)), 0) AS SIGNED) AS total_images, \
                CAST(AVG(price) AS DECIMAL(12,2)) AS avg_price \
         FROM products WHERE {HAS_IMAGES}"
    );
    Ok(sqlx::query_as::<_, ListingSummary>(&q)
        .fetch_one(&db.pool)
        .await?)
}

pub async fn products_with_images(db: &Db, limit: i64) -> Result<Vec<ImageCheckRow>> {
    let q = format!(
        "SELECT CAST(id AS CHAR) AS id, name, CAST(is_active AS SIGNED) AS is_active, \
                CAST(images AS CHAR) AS images \
         FROM products WHERE {HAS_IMAGES} ORDER BY name LIMIT ?"
    );
    Ok(sqlx::query_as::<_, ImageCheckRow>(&q)
        .bind(limit)
        .fetch_all(&db.pool)
        .await?)
}

pub async fn products_without_images(db: &Db, limit: i64) -> Result<Vec<ImageCheckRow>> {
    Ok(sqlx::query_as::<_, ImageCheckRow>(
        "SELECT CAST(id AS CHAR) AS id, name, CAST(is_active AS SIGNED) AS is_active, \
                CAST(images AS CHAR) AS images \
         FROM products WHERE images IS NULL OR images = '[]' ORDER BY name LIMIT ?",
    )
    .bind(limit)
    .fetch_all(&db.pool)
    .await?)
}

/// All active products with their stored image lists, by name.
pub async fn active_image_lists(db: &Db) -> Result<Vec<ImageCheckRow>> {
    Ok(sqlx::query_as::<_, ImageCheckRow>(
        "SELECT CAST(id AS CHAR) AS id, name, CAST(is_active AS SIGNED) AS is_active, \
                CAST(images AS CHAR) AS images \
         FROM products WHERE is_active = 1 ORDER BY name",
    )
    .fetch_all(&db.pool)
    .await?)
}

pub async fn database_overview(db: &Db) -> Result<DatabaseOverview> {
    let database = db.current_database().await?;
    let total = count(db, "SELECT COUNT(*) FROM products").await?;
    let with_images = count(db, &format!("SELECT COUNT(*) FROM products WHERE {HAS_IMAGES}")).await?;
    let active = count(db, "SELECT COUNT(*) FROM products WHERE is_active = true").await?;
    let sample = sqlx::query_as::<_, SampleProduct>(&format!(
        "SELECT CAST(id AS CHAR) AS id, name, slug, CAST(price AS DECIMAL(12,2)) AS price, \
                CAST(is_active AS SIGNED) AS is_active, CAST(images AS CHAR) AS images \
         FROM products WHERE {HAS_IMAGES} LIMIT 1"
    ))
    .fetch_optional(&db.pool)
    .await?;
    Ok(DatabaseOverview {
        database,
        total,
        with_images,
        active,
        sample,
    })
}

pub async fn import_overview(db: &Db) -> Result<ImportOverview> {
    let with_images = count(db, "SELECT COUNT(*) FROM products WHERE images IS NOT NULL").await?;
    let samples = sqlx::query_as::<_, ImportedProduct>(
        "SELECT CAST(id AS CHAR) AS id, name, CAST(category_id AS CHAR) AS category_id, \
                CAST(images AS CHAR) AS images \
         FROM products WHERE images IS NOT NULL LIMIT 5",
    )
    .fetch_all(&db.pool)
    .await?;
    let categories = sqlx::query_as::<_, CategoryRow>(
        "SELECT CAST(id AS CHAR) AS id, name, CAST(parent_id AS CHAR) AS parent_id \
         FROM categories WHERE is_active = true",
    )
    .fetch_all(&db.pool)
    .await?;
    Ok(ImportOverview {
        with_images,
        samples,
        categories,
    })
}

/// Price/stock/description view of imaged products, by name.
pub async fn price_listing(db: &Db) -> Result<Vec<PriceRow>> {
    Ok(sqlx::query_as::<_, PriceRow>(
        "SELECT name, CAST(price AS DECIMAL(12,2)) AS price, \
                CAST(stock_quantity AS SIGNED) AS stock_quantity, description \
         FROM products WHERE images IS NOT NULL ORDER BY name",
    )
    .fetch_all(&db.pool)
    .await?)
}
