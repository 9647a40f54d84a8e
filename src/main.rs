//! # MemeDoc CLI (`memedoc`)
//!
//! ## Usage
//!
//! ```bash
//! memedoc --config ./config/memedoc.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `memedoc init` | Create the SQLite database and run schema migrations |
//! | `memedoc sources` | List configured sources and their health status |
//! | `memedoc ingest <source>` | Discover, fetch, fingerprint and store items |
//! | `memedoc patterns` | Emerging templates in the recent window |
//! | `memedoc similar <source> <item_id>` | Stored records resembling one item |
//! | `memedoc evolution <hash>` | Lifecycle of one template |
//! | `memedoc stats` | Database summary |
//! | `memedoc export` | Dump all fingerprints as JSON |

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use memedoc::ingest::IngestOptions;
use memedoc::progress::ProgressMode;
use memedoc::{config, export, ingest, logging, migrate, sources, stats, trends};

/// MemeDoc CLI: meme template tracking across social sources.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/memedoc.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "memedoc",
    about = "MemeDoc — fingerprint meme images and track how templates spread",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/memedoc.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProgressArg {
    /// Human progress on a terminal, nothing otherwise.
    Auto,
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Auto => ProgressMode::default_for_tty(),
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// List configured sources and their health status.
    Sources,

    /// Ingest media items from one source.
    ///
    /// Discovers items, fetches and fingerprints their images concurrently,
    /// and stores new records. Items already stored are skipped.
    Ingest {
        /// Source name, matching a `[sources.<name>]` table.
        source: String,

        /// Topic to discover; `all` disables topic filtering.
        #[arg(long, default_value = "all")]
        topic: String,

        /// Maximum number of items to discover.
        #[arg(long, default_value_t = 100)]
        limit: usize,

        /// Maximum concurrent fetches (overrides `pipeline.concurrency`).
        #[arg(long)]
        concurrency: Option<usize>,

        /// Discover only; do not fetch or write.
        #[arg(long)]
        dry_run: bool,

        /// Progress reporting on stderr.
        #[arg(long, value_enum, default_value = "auto")]
        progress: ProgressArg,
    },

    /// Show emerging templates.
    Patterns {
        /// Lookback window (overrides `patterns.window_hours`).
        #[arg(long)]
        window_hours: Option<f64>,

        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Find stored records similar to one item.
    Similar {
        source: String,
        item_id: String,

        /// Minimum similarity (overrides `patterns.similarity_threshold`).
        #[arg(long)]
        threshold: Option<f64>,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Show the lifecycle of one template.
    Evolution {
        /// Perceptual hash of the template (16 hex digits).
        template_hash: String,

        #[arg(long)]
        json: bool,
    },

    /// Show database statistics.
    Stats {
        /// Number of top-scoring records to list.
        #[arg(long, default_value_t = 10)]
        top: usize,
    },

    /// Export all fingerprints as JSON.
    Export {
        /// Output file. Writes to stdout when omitted.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg).await?;
        }
        Commands::Ingest {
            source,
            topic,
            limit,
            concurrency,
            dry_run,
            progress,
        } => {
            let opts = IngestOptions {
                source,
                topic,
                limit,
                concurrency,
                dry_run,
                progress: progress.into(),
            };
            ingest::run_ingest(&cfg, &opts).await?;
        }
        Commands::Patterns { window_hours, json } => {
            trends::run_patterns(&cfg, window_hours, json).await?;
        }
        Commands::Similar {
            source,
            item_id,
            threshold,
            limit,
        } => {
            trends::run_similar(&cfg, &source, &item_id, threshold, limit).await?;
        }
        Commands::Evolution {
            template_hash,
            json,
        } => {
            trends::run_evolution(&cfg, &template_hash, json).await?;
        }
        Commands::Stats { top } => {
            stats::run_stats(&cfg, top).await?;
        }
        Commands::Export { output } => {
            export::run_export(&cfg, output.as_deref()).await?;
        }
    }

    Ok(())
}
