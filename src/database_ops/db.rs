use anyhow::{Context, Result};
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::MySqlPool;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

use crate::util::env as env_util;

#[derive(Clone)]
pub struct Db {
    pub pool: MySqlPool,
}

impl Db {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let connect_options = MySqlConnectOptions::from_str(database_url)
            .context("invalid MySQL connection string")?
            .charset("utf8mb4");

        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(connect_options)
            .await
            .context("connecting to MySQL")?;
        info!("connected to db");
        Ok(Self { pool })
    }

    /// Connect using `override_url` when given, else the env-resolved DSN.
    /// Pool size comes from `DB_MAX_CONNS` (default 5).
    pub async fn from_env(override_url: Option<&str>) -> Result<Self> {
        env_util::init_env();
        let url = match override_url {
            Some(url) => url.to_string(),
            None => env_util::db_url()?,
        };
        let max_conns = env_util::env_parse("DB_MAX_CONNS", 5u32).max(1);
        Self::connect(&url, max_conns).await
    }

    /// Name of the schema the pool is connected to.
    pub async fn current_database(&self) -> Result<Option<String>> {
        let name: Option<String> = sqlx::query_scalar("SELECT DATABASE()")
            .fetch_one(&self.pool)
            .await?;
        Ok(name)
    }

    /// Number of tables in the current schema (`SHOW TABLES`).
    pub async fn table_count(&self) -> Result<usize> {
        let rows = sqlx::raw_sql("SHOW TABLES").fetch_all(&self.pool).await?;
        Ok(rows.len())
    }
}
