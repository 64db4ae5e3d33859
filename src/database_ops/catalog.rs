use std::future::Future;

use anyhow::{Context, Result};
use sqlx::Row;
use tracing::{info, warn};

use super::db::Db;
use crate::matching::{Assignment, CatalogProduct};

/// Active products with images, and how many image URLs they hold in total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageStats {
    pub products_with_images: i64,
    pub total_images: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistSummary {
    pub updated: u64,
    pub failed: u64,
}

/// Where the image-list is considered present.
pub(crate) const HAS_IMAGES: &str = "images IS NOT NULL AND images != '[]'";

impl Db {
    /// Active catalog rows in the order the server returns them.
    pub async fn active_products(&self) -> Result<Vec<CatalogProduct>> {
        let rows = sqlx::query("SELECT CAST(id AS CHAR) AS id, name FROM products WHERE is_active = 1")
            .fetch_all(&self.pool)
            .await
            .context("loading active products")?;
        rows.into_iter()
            .map(|r| -> Result<CatalogProduct> {
                Ok(CatalogProduct {
                    id: r.try_get("id")?,
                    name: r.try_get("name")?,
                })
            })
            .collect()
    }

    /// Overwrite a product's image list. Returns affected rows.
    pub async fn set_product_images(&self, product_id: &str, urls: &[String]) -> Result<u64> {
        let json = serde_json::to_string(urls)?;
        let res = sqlx::query("UPDATE products SET images = ? WHERE id = ?")
            .bind(json)
            .bind(product_id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("updating images of product {product_id}"))?;
        Ok(res.rows_affected())
    }

    /// Write every assignment; a failing update is logged and counted, the rest
    /// still run. Each statement commits on its own.
    pub async fn persist_assignments(&self, assignments: &[Assignment]) -> PersistSummary {
        persist_each(assignments, |a| self.set_product_images(&a.product_id, &a.images)).await
    }

    pub async fn image_stats(&self) -> Result<ImageStats> {
        let sql = format!(
            "SELECT COUNT(*) AS products, \
                    CAST(COALESCE(SUM(JSON_LENGTH(images)), 0) AS SIGNED) AS images \
             FROM products WHERE {HAS_IMAGES} AND is_active = 1"
        );
        let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
        Ok(ImageStats {
            products_with_images: row.try_get("products")?,
            total_images: row.try_get("images")?,
        })
    }
}

/// Run `write` for each assignment in order, counting failures instead of
/// stopping at them.
pub(crate) async fn persist_each<'a, F, Fut>(
    assignments: &'a [Assignment],
    mut write: F,
) -> PersistSummary
where
    F: FnMut(&'a Assignment) -> Fut,
    Fut: Future<Output = Result<u64>>,
{
    let mut summary = PersistSummary::default();
    for a in assignments {
        match write(a).await {
            Ok(_) => {
                summary.updated += 1;
                info!(
                    target = "catalog",
                    product = %a.product_name,
                    folder = %a.folder_key,
                    images = a.images.len(),
                    "images updated"
                );
            }
            Err(err) => {
                summary.failed += 1;
                warn!(target = "catalog", product = %a.product_name, error = %err, "image update failed");
            }
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    fn assignment(id: &str) -> Assignment {
        Assignment {
            product_id: id.to_string(),
            product_name: format!("product {id}"),
            folder_key: format!("boys/item {id}"),
            score: 100,
            images: vec![format!("/storage/uploads/products/boys/item {id}/1.jpg")],
        }
    }

    #[tokio::test]
    async fn failed_update_does_not_stop_later_rows() {
        let assignments = vec![assignment("1"), assignment("2"), assignment("3")];
        let mut written = Vec::new();

        let summary = persist_each(&assignments, |a| {
            let id = a.product_id.clone();
            let ok = id != "2";
            if ok {
                written.push(id.clone());
            }
            async move {
                if !ok {
                    bail!("lock wait timeout on product {id}");
                }
                Ok::<u64, anyhow::Error>(1)
            }
        })
        .await;

        assert_eq!(summary, PersistSummary { updated: 2, failed: 1 });
        assert_eq!(written, vec!["1", "3"]);
    }

    #[tokio::test]
    async fn empty_batch_writes_nothing() {
        let summary = persist_each(&[], |_| async { Ok::<u64, anyhow::Error>(1) }).await;
        assert_eq!(summary, PersistSummary::default());
    }
}
