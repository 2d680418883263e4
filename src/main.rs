//! # Greenhouse Growth CLI (`grow`)
//!
//! The `grow` binary feeds analysed plant images into the growth engine and
//! reads the resulting history back out.
//!
//! ## Usage
//!
//! ```bash
//! grow --config ./config/grow.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `grow ingest` | Pair and account analysed images read as JSON lines |
//! | `grow history` | Print a plant's blocks as JSON |
//! | `grow series` | Print the most recent growth points as JSON |
//! | `grow parse <name>` | Show how a file name would be paired |
//!
//! ## Examples
//!
//! ```bash
//! # Ingest a batch exported by the analysis service
//! grow ingest --input analyses.jsonl --config ./config/grow.toml
//!
//! # Stream from another process
//! analyse-captures | grow ingest --plant Basil
//!
//! # Last ten growth points for the default plant
//! grow series --limit 10
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use greenhouse_growth::{config, ingest, logging, query};

/// Greenhouse Growth CLI: pairing, deduplication and growth accounting for
/// plant-image captures.
///
/// Every command except `parse` reads a TOML configuration file given by
/// `--config`. See `config/grow.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "grow",
    about = "Greenhouse Growth: pair plant-image captures and track growth over time",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/grow.toml")]
    config: PathBuf,

    /// Log at debug level unless `GROW_LOG` says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest analysed images.
    ///
    /// Reads one JSON object per line (`fileKey`, `captureTime`,
    /// `areaPixels`, `diseaseClass`, optional `plant`). Each line is
    /// deduplicated, paired with its partner image and, once the pair is
    /// complete, appended to the history.
    Ingest {
        /// Input file of JSON lines, or `-` for stdin.
        #[arg(long, default_value = "-")]
        input: PathBuf,

        /// Plant for lines that do not name one. Defaults to `plant.name`.
        #[arg(long)]
        plant: Option<String>,
    },

    /// Print a plant's history blocks as JSON.
    History {
        /// Plant name. Defaults to `plant.name`.
        #[arg(long)]
        plant: Option<String>,
    },

    /// Print the most recent growth points as JSON.
    Series {
        /// Plant name. Defaults to `plant.name`.
        #[arg(long)]
        plant: Option<String>,

        /// Number of points. Defaults to `series.default_limit`.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show the group id, position and dedup identifier of a file name.
    Parse {
        /// File name or storage key, e.g. `12_1_left.jpg`.
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    // Commands that don't require config
    if let Commands::Parse { name } = &cli.command {
        return query::run_parse(name);
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest { input, plant } => {
            ingest::run_ingest(&cfg, &input, plant).await?;
        }
        Commands::History { plant } => {
            query::run_history(&cfg, plant.as_deref()).await?;
        }
        Commands::Series { plant, limit } => {
            query::run_series(&cfg, plant.as_deref(), limit).await?;
        }
        Commands::Parse { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}
