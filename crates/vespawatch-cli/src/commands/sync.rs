use std::path::Path;

use vespawatch_core::config::SyncSettings;
use vespawatch_core::db::{LibSqlObservationRepository, ObservationRepository};
use vespawatch_core::inat::{InatApiClient, RemoteClient};
use vespawatch_core::reconcile::ReconciliationEngine;

use crate::commands::common::{credentials_from_env, open_database, open_media_store};
use crate::error::CliError;

/// Pull project observations and reconcile each payload locally.
///
/// Per-payload failures are logged and the batch continues; a broken payload
/// must never abort the whole sweep.
pub async fn run_pull(db_path: &Path, media_dir: &Path) -> Result<(), CliError> {
    let settings = SyncSettings::from_env()?;
    let db = open_database(db_path).await?;
    let media = open_media_store(media_dir)?;
    let client = InatApiClient::new(&settings.api_base_url)?;
    let engine =
        ReconciliationEngine::new(db.connection(), &settings, &media, &client, &client);

    let payloads = client
        .fetch_project_observations(settings.project_id)
        .await?;

    let mut reconciled = 0usize;
    let mut skipped = 0usize;
    for payload in &payloads {
        match engine.apply(payload).await {
            Ok(_) => reconciled += 1,
            Err(error) => {
                skipped += 1;
                tracing::warn!(remote_id = payload.id, "Skipped payload: {error}");
                continue;
            }
        }
        if let Err(error) = engine.check_membership(payload).await {
            tracing::warn!(remote_id = payload.id, "Membership check failed: {error}");
        }
    }

    println!("Reconciled {reconciled} observations ({skipped} skipped)");
    Ok(())
}

/// Push locally-created observations, then sweep the deletion ledger.
pub async fn run_push(db_path: &Path, media_dir: &Path) -> Result<(), CliError> {
    let settings = SyncSettings::from_env()?;
    let credentials = credentials_from_env()?;
    let db = open_database(db_path).await?;
    let media = open_media_store(media_dir)?;
    let client = InatApiClient::new(&settings.api_base_url)?;
    let engine =
        ReconciliationEngine::new(db.connection(), &settings, &media, &client, &client);

    let unpushed = LibSqlObservationRepository::new(db.connection())
        .list_unpushed()
        .await?;

    let mut pushed = 0usize;
    let mut failed = 0usize;
    for mut observation in unpushed {
        match engine.push_to_remote(&mut observation, &credentials).await {
            Ok(()) => pushed += 1,
            Err(error) => {
                failed += 1;
                tracing::warn!(id = %observation.id, "Push failed, will retry next cycle: {error}");
            }
        }
    }

    let deleted = engine.process_deletion_ledger(&credentials).await?;

    println!("Pushed {pushed} observations ({failed} failed), processed {deleted} pending deletions");
    Ok(())
}
