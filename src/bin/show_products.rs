use anyhow::Result;
use catalog_upkeep::cli::reports::{run, ReportsConfig};
use catalog_upkeep::logging::{init_tracing, DEFAULT_FILTER};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(DEFAULT_FILTER)?;
    catalog_upkeep::util::env::bootstrap_cli("show_products");

    run(ReportsConfig::default()).await
}
