use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "vespawatch")]
#[command(about = "Manage Vespa-Watch observations and remote synchronization")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional directory for observation pictures
    #[arg(long, global = true, value_name = "PATH")]
    pub media_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synchronize observations with the remote platform
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Export observations and management actions
    Export {
        /// What to export
        #[arg(long, value_enum)]
        kind: ExportKind,
        /// Export format
        #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Manage the taxon registry
    Taxa {
        #[command(subcommand)]
        command: TaxaCommands,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Pull project observations from the remote platform and reconcile them
    Pull,
    /// Push local creations, then process the pending-deletion ledger
    Push,
}

#[derive(Subcommand)]
pub enum TaxaCommands {
    /// List registered taxa with their push/pull identifiers
    List,
    /// Register a new taxon
    Add {
        /// Scientific name
        #[arg(long)]
        name: String,
        /// Vernacular name
        #[arg(long)]
        vernacular_name: Option<String>,
        /// Remote taxon id used when pushing observations
        #[arg(long)]
        push_taxon_id: i64,
        /// Remote taxon ids reconciled to this taxon when pulling
        #[arg(long, value_delimiter = ',')]
        pull_taxon_ids: Vec<i64>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ExportKind {
    Nests,
    Individuals,
    Actions,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}
