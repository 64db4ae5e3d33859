use std::path::PathBuf;

use anyhow::Result;
use catalog_upkeep::cli;
use catalog_upkeep::cli::products::ProductsAction;
use catalog_upkeep::cli::reports::ReportKind;
use catalog_upkeep::config::StorageConfig;
use catalog_upkeep::logging::{init_tracing, DEFAULT_FILTER};
use catalog_upkeep::util::env;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "catalog", version, about = "Product catalog maintenance CLI")]
struct Cli {
    /// Optional override for the MySQL connection string
    #[arg(long, global = true)]
    db_url: Option<String>,
    /// JSON rules file (defaults to CATALOG_RULES, then built-in tables)
    #[arg(long, global = true)]
    rules: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Normalize photos, copy them to uploads and assign folders to products
    Images {
        /// Raw photo tree (defaults to PRODUCTS_DIR)
        #[arg(long)]
        products_dir: Option<PathBuf>,
        /// Web-served tree (defaults to UPLOADS_DIR)
        #[arg(long)]
        uploads_dir: Option<PathBuf>,
        /// Skip HEIC conversion and recompression
        #[arg(long, default_value_t = false)]
        skip_normalize: bool,
        /// Print assignments without writing them
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Only run the normalization pass over a tree
    Normalize {
        /// Tree to normalize (defaults to PRODUCTS_DIR)
        path: Option<PathBuf>,
    },
    /// Count images per folder
    ScanImages {
        /// Tree to scan (defaults to UPLOADS_DIR)
        path: Option<PathBuf>,
    },
    /// Rename every folder below a tree to lower case
    LowercaseFolders {
        /// Tree to rename (defaults to PRODUCTS_DIR)
        path: Option<PathBuf>,
    },
    /// View or bulk-update products from the rules tables
    Products {
        #[arg(value_enum, default_value_t = ProductsArg::View)]
        action: ProductsArg,
    },
    /// Fill missing prices/stock/sizes and activate imaged products
    Activate,
    /// Read-only reports
    Report {
        #[arg(value_enum, default_value_t = ReportArg::Products)]
        kind: ReportArg,
        /// Row limit for the images report
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Show folders, image coverage and a matcher dry run
    DebugMatching,
    /// Replace the local database with a dump of the live one
    SyncFromLive {
        /// Do not ask for confirmation
        #[arg(long, default_value_t = false)]
        yes: bool,
        /// Keep the dump file after importing
        #[arg(long, default_value_t = false)]
        keep_dump: bool,
        /// Directory for the dump file
        #[arg(long)]
        dump_dir: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ProductsArg {
    View,
    Prices,
    Stock,
    Sizes,
    Activate,
}

impl From<ProductsArg> for ProductsAction {
    fn from(arg: ProductsArg) -> Self {
        match arg {
            ProductsArg::View => ProductsAction::View,
            ProductsArg::Prices => ProductsAction::Prices,
            ProductsArg::Stock => ProductsAction::Stock,
            ProductsArg::Sizes => ProductsAction::Sizes,
            ProductsArg::Activate => ProductsAction::Activate,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ReportArg {
    Products,
    Images,
    Database,
    Import,
}

impl From<ReportArg> for ReportKind {
    fn from(arg: ReportArg) -> Self {
        match arg {
            ReportArg::Products => ReportKind::Products,
            ReportArg::Images => ReportKind::Images,
            ReportArg::Database => ReportKind::Database,
            ReportArg::Import => ReportKind::Import,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(DEFAULT_FILTER)?;
    env::bootstrap_cli("catalog");

    let args = Cli::parse();
    let db_url = args.db_url;
    let rules_path = args.rules;

    match args.command {
        Commands::Images {
            products_dir,
            uploads_dir,
            skip_normalize,
            dry_run,
        } => {
            let mut storage = StorageConfig::from_env();
            if let Some(dir) = products_dir {
                storage.products_dir = dir;
            }
            if let Some(dir) = uploads_dir {
                storage.uploads_dir = dir;
            }
            cli::images::run(cli::images::ImagePipelineConfig {
                storage: Some(storage),
                rules_path,
                database_url: db_url,
                skip_normalize,
                dry_run,
            })
            .await
        }
        Commands::Normalize { path } => cli::folders::normalize(path),
        Commands::ScanImages { path } => cli::folders::scan_images(path),
        Commands::LowercaseFolders { path } => cli::folders::lowercase(path),
        Commands::Products { action } => {
            cli::products::run(cli::products::ProductsConfig {
                action: action.into(),
                rules_path,
                database_url: db_url,
            })
            .await
        }
        Commands::Activate => {
            cli::activate::run(cli::activate::ActivateConfig {
                rules_path,
                database_url: db_url,
            })
            .await
        }
        Commands::Report { kind, limit } => {
            cli::reports::run(cli::reports::ReportsConfig {
                kind: kind.into(),
                limit,
                database_url: db_url,
            })
            .await
        }
        Commands::DebugMatching => {
            cli::debug_matching::run(cli::debug_matching::DebugMatchingConfig {
                storage: None,
                rules_path,
                database_url: db_url,
            })
            .await
        }
        Commands::SyncFromLive {
            yes,
            keep_dump,
            dump_dir,
        } => {
            cli::sync_db::run(cli::sync_db::SyncConfig {
                assume_yes: yes,
                keep_dump,
                dump_dir,
                dump_prefix: None,
            })
            .await
        }
    }
}
