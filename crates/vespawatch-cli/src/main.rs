//! Vespa-Watch CLI - synchronization, exports and registry management
//!
//! Drives the pull/push reconciliation cycles against the remote platform
//! and renders the CSV/JSON reports from the command line.

mod cli;
mod commands;
mod error;

use clap::Parser;

use cli::{Cli, Commands, SyncCommands, TaxaCommands};
use commands::common::{resolve_db_path, resolve_media_dir};
use error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vespawatch=info".parse().expect("valid directive")),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);
    let media_dir = resolve_media_dir(cli.media_dir);

    match cli.command {
        Commands::Sync { command } => match command {
            SyncCommands::Pull => commands::sync::run_pull(&db_path, &media_dir).await?,
            SyncCommands::Push => commands::sync::run_push(&db_path, &media_dir).await?,
        },
        Commands::Export {
            kind,
            format,
            output,
        } => {
            commands::export::run_export(kind, format, output.as_deref(), &db_path).await?;
        }
        Commands::Taxa { command } => match command {
            TaxaCommands::List => commands::taxa::run_list(&db_path).await?,
            TaxaCommands::Add {
                name,
                vernacular_name,
                push_taxon_id,
                pull_taxon_ids,
            } => {
                commands::taxa::run_add(
                    &name,
                    vernacular_name,
                    push_taxon_id,
                    pull_taxon_ids,
                    &db_path,
                )
                .await?;
            }
        },
    }

    Ok(())
}
