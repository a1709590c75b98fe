//! # Dossier CLI (`dossier`)
//!
//! Operator interface for a personnel archive: import a directory tree of
//! per-person folders, then search it by name, id and category with the
//! matching spreadsheet row attached to every file.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dossier init` | Create the SQLite database and run schema migrations |
//! | `dossier import [ROOT]` | Scan an import root and replace the index |
//! | `dossier search --name 张三` | Search the index |
//! | `dossier categories [LABEL]` | Print the category tree |
//! | `dossier catalog --id 007 --name 张三` | Dump one person's spreadsheet |
//! | `dossier prune` | Drop index rows whose files are gone |
//! | `dossier stats` | Index statistics |
//! | `dossier serve` | Start the JSON HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! dossier init --config ./config/dossier.toml
//! dossier import /srv/archive
//! dossier search --name 张三 --id 007 --category 4-1
//! dossier categories 九、工资、任免、出国和会议代表等材料
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dossier::progress::ProgressMode;
use dossier::search::SearchRequest;
use dossier::{catalog, categories, config, ingest, migrate, search, server, stats};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Dossier: index and search a personnel archive.
///
/// All commands except `categories` read a TOML configuration file given by
/// `--config`. See `config/dossier.example.toml`.
#[derive(Parser)]
#[command(
    name = "dossier",
    about = "Dossier: index and search a personnel archive",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/dossier.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it again is safe.
    Init,

    /// Scan an import root and publish the index.
    ///
    /// The previous index stays in place until the scan has finished.
    /// Ctrl-C cancels the scan and leaves the index untouched.
    Import {
        /// Import root. Defaults to `[archive] root`, then the last import.
        root: Option<PathBuf>,

        /// Scan and report without writing to the database.
        #[arg(long)]
        dry_run: bool,

        /// Progress output on stderr. Defaults to `human` on a terminal.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Search by name and/or id, optionally restricted to a category.
    Search {
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        id: Option<String>,

        /// Category code (`4-1`), label, or display label (`1、学历学位材料`).
        #[arg(long)]
        category: Option<String>,

        /// Import root to read spreadsheets from; defaults to the last import.
        #[arg(long)]
        root: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Print the category tree, or the children of one category.
    Categories {
        /// Code, label, or display label.
        label: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Print every sheet of one person's spreadsheet.
    Catalog {
        #[arg(long)]
        id: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        root: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Remove index rows for files and folders that no longer exist.
    Prune,

    /// Show index statistics.
    Stats,

    /// Start the JSON HTTP server.
    Serve,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dossier=info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// A token cancelled on the first Ctrl-C.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling");
            child.cancel();
        }
    });
    token
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Categories { label, json } = &cli.command {
        return categories::run_categories(label.clone(), *json);
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import {
            root,
            dry_run,
            progress,
        } => {
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            ingest::run_import(&cfg, root, dry_run, progress, shutdown_token()).await?;
        }
        Commands::Search {
            name,
            id,
            category,
            root,
            json,
        } => {
            let request = SearchRequest { name, id, category };
            search::run_search(&cfg, request, root, json).await?;
        }
        Commands::Categories { .. } => {}
        Commands::Catalog {
            id,
            name,
            root,
            json,
        } => {
            catalog::run_catalog(&cfg, &id, &name, root, json).await?;
        }
        Commands::Prune => {
            ingest::run_prune(&cfg).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg, shutdown_token()).await?;
        }
    }

    Ok(())
}
