//! # Catalog Sync CLI (`catalog`)
//!
//! Keeps book records consistent across the thumbnail object store, the
//! document store and the vector index.
//!
//! ## Usage
//!
//! ```bash
//! catalog --config ./config/catalog.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `catalog init` | Create the SQLite document-store schema |
//! | `catalog populate <file>` | Write records to the selected stores |
//! | `catalog erase` | Remove records (or everything) from the selected stores |
//! | `catalog embed <file>` | Print weighted embeddings as JSON |
//! | `catalog key <file>` | Print each record's canonical key |
//!
//! ## Examples
//!
//! ```bash
//! # Everything, with a JSON report for scripts
//! catalog populate data/books.json --all --json
//!
//! # Retry only the document store after a partial success
//! catalog populate data/books.json --document-store
//!
//! # Remove two books from the index and the object store
//! catalog erase --isbn 9780061054884 --isbn 9780441569595 --vector-index --object-store
//! ```
//!
//! Exit status is 0 for full success (or no targets), 2 for partial
//! success and 1 for total failure or a command error.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use catalog_sync::commands;
use catalog_sync::config::{self, Config};
use catalog_sync::logging;
use catalog_sync::progress::ProgressMode;
use catalog_sync::sync::OverallStatus;
use catalog_sync::traits::StoreKind;

/// Catalog Sync: populate and erase book records across an object store,
/// a document store and a vector index.
#[derive(Parser)]
#[command(name = "catalog", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/catalog.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the document-store schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Write records to the selected stores.
    ///
    /// Stores are written concurrently and independently: a failure in one
    /// store is reported and does not stop the others.
    Populate {
        /// JSON array of records.
        file: PathBuf,

        #[command(flatten)]
        targets: TargetArgs,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,

        /// Progress output on stderr. Defaults to `human` on a TTY.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Remove records from the selected stores.
    ///
    /// Without `--isbn`, every record is removed.
    Erase {
        /// ISBN-13 to remove. Repeatable.
        #[arg(long = "isbn")]
        isbns: Vec<String>,

        #[command(flatten)]
        targets: TargetArgs,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print each record's weighted embedding as JSON.
    Embed {
        /// JSON array of records.
        file: PathBuf,
    },

    /// Print each record's canonical key and thumbnail object key.
    Key {
        /// JSON array of records.
        file: PathBuf,
    },
}

#[derive(Args)]
struct TargetArgs {
    /// Target the thumbnail object store.
    #[arg(long)]
    object_store: bool,

    /// Target the document store.
    #[arg(long)]
    document_store: bool,

    /// Target the vector index.
    #[arg(long)]
    vector_index: bool,

    /// Target all three stores.
    #[arg(long)]
    all: bool,
}

impl TargetArgs {
    fn stores(&self) -> Vec<StoreKind> {
        StoreKind::ALL
            .into_iter()
            .filter(|s| {
                self.all
                    || match s {
                        StoreKind::ObjectStore => self.object_store,
                        StoreKind::DocumentStore => self.document_store,
                        StoreKind::VectorIndex => self.vector_index,
                    }
            })
            .collect()
    }
}

fn exit_code(status: OverallStatus) -> ExitCode {
    match status {
        OverallStatus::FullSuccess | OverallStatus::NoTargets => ExitCode::SUCCESS,
        OverallStatus::PartialSuccess => ExitCode::from(2),
        OverallStatus::TotalFailure => ExitCode::from(1),
    }
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted; cancelling in-flight work...");
            token.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    // `key` only needs the thumbnail prefix; fall back to defaults.
    if let Commands::Key { file } = &cli.command {
        let cfg = config::load_config(&cli.config).unwrap_or_else(|_| Config::default());
        commands::run_key(&cfg, file)?;
        return Ok(ExitCode::SUCCESS);
    }

    let cfg = config::load_config(&cli.config)?;
    let cancel = CancellationToken::new();

    match cli.command {
        Commands::Init => {
            commands::run_init(&cfg).await?;
        }
        Commands::Populate {
            file,
            targets,
            json,
            progress,
        } => {
            cancel_on_ctrl_c(cancel.clone());
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            let status = commands::run_populate(
                &cfg,
                &file,
                &targets.stores(),
                json,
                progress,
                &cancel,
            )
            .await?;
            return Ok(exit_code(status));
        }
        Commands::Erase {
            isbns,
            targets,
            json,
        } => {
            cancel_on_ctrl_c(cancel.clone());
            let status =
                commands::run_erase(&cfg, &isbns, &targets.stores(), json, &cancel).await?;
            return Ok(exit_code(status));
        }
        Commands::Embed { file } => {
            commands::run_embed(&cfg, &file).await?;
        }
        Commands::Key { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(ExitCode::SUCCESS)
}
