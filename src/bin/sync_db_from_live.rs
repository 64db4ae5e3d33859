use anyhow::Result;
use catalog_upkeep::cli::sync_db::{run, SyncConfig};
use catalog_upkeep::logging::{init_tracing, DEFAULT_FILTER};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(DEFAULT_FILTER)?;
    catalog_upkeep::util::env::bootstrap_cli("sync_db_from_live");

    run(SyncConfig::default()).await
}
