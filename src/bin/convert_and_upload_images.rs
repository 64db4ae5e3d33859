use anyhow::Result;
use catalog_upkeep::cli::images::{run, ImagePipelineConfig};
use catalog_upkeep::logging::{init_tracing, DEFAULT_FILTER};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(DEFAULT_FILTER)?;
    catalog_upkeep::util::env::bootstrap_cli("convert_and_upload_images");

    run(ImagePipelineConfig::default()).await
}
