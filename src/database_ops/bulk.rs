//! Rule-driven bulk updates over the `products` table.
//!
//! Every rule is a `name LIKE %pattern%` match with an injected value. Each
//! statement auto-commits; a rule that fails is logged and reported with zero
//! affected rows so later rules still run.

use anyhow::Result;
use bigdecimal::BigDecimal;
use indexmap::IndexMap;
use sqlx::Row;
use tracing::{info, warn};

use super::catalog::HAS_IMAGES;
use super::db::Db;
use crate::config::CatalogRules;

/// Result of one pattern rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOutcome {
    pub pattern: String,
    /// Display form of the value written.
    pub value: String,
    pub rows: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadinessSummary {
    pub total: i64,
    pub active: i64,
    pub with_price: i64,
    pub with_stock: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ActivationReport {
    pub prices: Vec<RuleOutcome>,
    pub default_stock: u64,
    pub sizes: Vec<RuleOutcome>,
    pub activated: u64,
    pub summary: ReadinessSummary,
}

/// `%pattern%`; the pattern is used as-is, so `%` and `_` keep their LIKE meaning.
pub fn like_pattern(pattern: &str) -> String {
    format!("%{pattern}%")
}

fn outcome(pattern: &str, value: String, res: Result<u64, sqlx::Error>) -> RuleOutcome {
    let rows = match res {
        Ok(rows) => rows,
        Err(err) => {
            warn!(target = "bulk", pattern, error = %err, "rule failed");
            0
        }
    };
    RuleOutcome {
        pattern: pattern.to_string(),
        value,
        rows,
    }
}

impl Db {
    /// Set `price` for every pattern. With `only_unpriced`, rows whose price is
    /// already non-zero are left alone.
    pub async fn apply_prices(
        &self,
        prices: &IndexMap<String, BigDecimal>,
        only_unpriced: bool,
    ) -> Vec<RuleOutcome> {
        let sql = if only_unpriced {
            "UPDATE products SET price = ? WHERE name LIKE ? AND price = 0"
        } else {
            "UPDATE products SET price = ? WHERE name LIKE ?"
        };
        let mut out = Vec::with_capacity(prices.len());
        for (pattern, price) in prices {
            let res = sqlx::query(sql)
                .bind(price)
                .bind(like_pattern(pattern))
                .execute(&self.pool)
                .await
                .map(|r| r.rows_affected());
            out.push(outcome(pattern, price.to_string(), res));
        }
        out
    }

    pub async fn apply_stock(&self, stock: &IndexMap<String, i32>) -> Vec<RuleOutcome> {
        let mut out = Vec::with_capacity(stock.len());
        for (pattern, qty) in stock {
            let res = sqlx::query("UPDATE products SET stock_quantity = ? WHERE name LIKE ?")
                .bind(qty)
                .bind(like_pattern(pattern))
                .execute(&self.pool)
                .await
                .map(|r| r.rows_affected());
            out.push(outcome(pattern, qty.to_string(), res));
        }
        out
    }

    /// Give imaged products with zero stock a default quantity.
    pub async fn apply_default_stock(&self, qty: i32) -> Result<u64> {
        let sql = format!("UPDATE products SET stock_quantity = ? WHERE stock_quantity = 0 AND {HAS_IMAGES}");
        let res = sqlx::query(&sql).bind(qty).execute(&self.pool).await?;
        Ok(res.rows_affected())
    }

    /// Write size ladders as JSON arrays. With `only_missing`, rows that already
    /// carry sizes are left alone.
    pub async fn apply_sizes(
        &self,
        sizes: &IndexMap<String, Vec<String>>,
        only_missing: bool,
    ) -> Result<Vec<RuleOutcome>> {
        let sql = if only_missing {
            "UPDATE products SET sizes = ? WHERE name LIKE ? AND (sizes IS NULL OR sizes = '[]')"
        } else {
            "UPDATE products SET sizes = ? WHERE name LIKE ?"
        };
        let mut out = Vec::with_capacity(sizes.len());
        for (pattern, ladder) in sizes {
            let json = serde_json::to_string(ladder)?;
            let res = sqlx::query(sql)
                .bind(&json)
                .bind(like_pattern(pattern))
                .execute(&self.pool)
                .await
                .map(|r| r.rows_affected());
            out.push(outcome(pattern, json, res));
        }
        Ok(out)
    }

    /// Mark every product with a non-empty image list active.
    pub async fn activate_with_images(&self) -> Result<u64> {
        let sql = format!("UPDATE products SET is_active = true WHERE {HAS_IMAGES}");
        let res = sqlx::query(&sql).execute(&self.pool).await?;
        Ok(res.rows_affected())
    }

    pub async fn readiness_summary(&self) -> Result<ReadinessSummary> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, \
                    CAST(COALESCE(SUM(CASE WHEN is_active = true THEN 1 ELSE 0 END), 0) AS SIGNED) AS active, \
                    CAST(COALESCE(SUM(CASE WHEN price > 0 THEN 1 ELSE 0 END), 0) AS SIGNED) AS with_price, \
                    CAST(COALESCE(SUM(CASE WHEN stock_quantity > 0 THEN 1 ELSE 0 END), 0) AS SIGNED) AS with_stock \
             FROM products WHERE images IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(ReadinessSummary {
            total: row.try_get("total")?,
            active: row.try_get("active")?,
            with_price: row.try_get("with_price")?,
            with_stock: row.try_get("with_stock")?,
        })
    }

    /// Fill in missing prices, stock and sizes, then activate imaged products.
    pub async fn activate_products(&self, rules: &CatalogRules) -> Result<ActivationReport> {
        let prices = self.apply_prices(&rules.default_prices, true).await;
        let default_stock = self.apply_default_stock(rules.default_stock).await?;
        let sizes = self.apply_sizes(&rules.sizes, true).await?;
        let activated = self.activate_with_images().await?;
        let summary = self.readiness_summary().await?;
        info!(
            target = "bulk",
            activated,
            default_stock,
            total = summary.total,
            "activation pass complete"
        );
        Ok(ActivationReport {
            prices,
            default_stock,
            sizes,
            activated,
            summary,
        })
    }
}
