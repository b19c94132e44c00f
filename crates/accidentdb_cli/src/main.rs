//! accidentdb CLI
//!
//! Command-line administration of an accidentdb store.
//!
//! # Commands
//!
//! - `inspect` - Display store statistics
//! - `verify` - Check the data file, index and counter for consistency
//! - `rebuild` - Regenerate the index from the data file
//! - `compact` - Rewrite the data file without tombstones
//! - `backup` / `list-backups` / `restore` - Manage snapshots
//! - `import` / `export` - Move records in and out as delimited text or JSON
//! - `show` / `delete` - Work with a single record
//! - `clear` - Remove every record

mod commands;

use accidentdb_core::{Config, RecordId, Store};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// accidentdb command-line store tools.
#[derive(Parser)]
#[command(name = "accidentdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory (overrides the config file)
    #[arg(global = true, short, long)]
    data_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable text
    Text,
    /// Pretty-printed JSON
    Json,
}

/// File format for exports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    /// Delimited text with a header row
    Csv,
    /// JSON array of objects
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Display store statistics
    Inspect {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: ReportFormat,
    },

    /// Verify store integrity
    Verify {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: ReportFormat,
    },

    /// Rebuild the index from the data file
    Rebuild,

    /// Rewrite the data file without tombstones
    Compact,

    /// Take a snapshot of the store
    Backup,

    /// List snapshots, newest first
    ListBackups,

    /// Restore a snapshot
    Restore {
        /// Snapshot name (see `list-backups`)
        #[arg(required_unless_present = "latest")]
        name: Option<String>,

        /// Restore the newest snapshot
        #[arg(long, conflicts_with = "name")]
        latest: bool,
    },

    /// Import records from a delimited text file
    Import {
        /// Source file; the first line must name the columns
        file: PathBuf,

        /// Field delimiter (defaults to the configured one)
        #[arg(long)]
        delimiter: Option<char>,
    },

    /// Export live records
    Export {
        /// Destination file
        file: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "csv")]
        format: ExportFormat,

        /// Field delimiter for CSV output (defaults to the configured one)
        #[arg(long)]
        delimiter: Option<char>,
    },

    /// Print one record
    Show {
        /// Record id
        id: u64,
    },

    /// Delete one record
    Delete {
        /// Record id
        id: u64,
    },

    /// Remove every record and reset the id counter
    Clear {
        /// Confirm the operation
        #[arg(long)]
        yes: bool,
    },
}

fn load_config(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };
    Ok(match &cli.data_dir {
        Some(dir) => config.data_dir(dir),
        None => config,
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let store = Store::open(load_config(&cli)?)?;

    match cli.command {
        Commands::Inspect { format } => commands::inspect::run(&store, format)?,
        Commands::Verify { format } => commands::verify::run(&store, format)?,
        Commands::Rebuild => commands::maintenance::rebuild(&store)?,
        Commands::Compact => commands::maintenance::compact(&store)?,
        Commands::Clear { yes } => commands::maintenance::clear(&store, yes)?,
        Commands::Backup => commands::backup::create(&store)?,
        Commands::ListBackups => commands::backup::list(&store)?,
        Commands::Restore { name, latest } => {
            commands::backup::restore(&store, name.as_deref(), latest)?;
        }
        Commands::Import { file, delimiter } => {
            commands::transfer::import(&store, &file, delimiter)?;
        }
        Commands::Export {
            file,
            format,
            delimiter,
        } => commands::transfer::export(&store, &file, format, delimiter)?,
        Commands::Show { id } => commands::record::show(&store, RecordId::new(id))?,
        Commands::Delete { id } => commands::record::delete(&store, RecordId::new(id))?,
    }

    Ok(())
}
