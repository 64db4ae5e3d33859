use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Filter used by the catalog binaries when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,sqlx=warn";

/// Installs the subscriber every catalog binary logs through.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` applies, which for the
/// binaries is [`DEFAULT_FILTER`] (pipeline targets such as `normalize`, `scan`,
/// `catalog` and `sync` at info, sqlx statement logs only at warn). Output keeps
/// targets and drops timestamps.
pub fn init_tracing(default_filter: &str) -> Result<(), anyhow::Error> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .without_time()
        .try_init()
        .map_err(|e| anyhow::anyhow!("tracing already initialized: {e}"))
}
