use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use vespawatch_core::db::{
    LibSqlManagementActionRepository, LibSqlObservationRepository, LibSqlTaxonRepository,
    ManagementActionRepository, ObservationRepository, TaxonRepository,
};
use vespawatch_core::export::{
    individual_csv_record, management_action_csv_record, nest_csv_record, observation_list_item,
    render_csv,
};
use vespawatch_core::models::{Observation, ObservationKind, TaxonId};

use crate::cli::{ExportFormat, ExportKind};
use crate::commands::common::open_database;
use crate::error::CliError;

pub async fn run_export(
    kind: ExportKind,
    format: ExportFormat,
    output_path: Option<&Path>,
    db_path: &Path,
) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let conn = db.connection();
    let observations = LibSqlObservationRepository::new(conn);
    let actions = LibSqlManagementActionRepository::new(conn);

    let names: HashMap<TaxonId, String> = LibSqlTaxonRepository::new(conn)
        .list()
        .await?
        .into_iter()
        .map(|taxon| (taxon.id, taxon.name))
        .collect();
    let species_name = |observation: &Observation| {
        observation
            .taxon_id
            .and_then(|taxon_id| names.get(&taxon_id))
            .map(String::as_str)
            .map(str::to_string)
    };

    let rendered = match kind {
        ExportKind::Nests => {
            let nests = list_all(&observations, ObservationKind::Nest).await?;
            match format {
                ExportFormat::Csv => {
                    let mut records = Vec::new();
                    for observation in &nests {
                        let action = actions.get(&observation.id).await?;
                        records.push(nest_csv_record(
                            observation,
                            species_name(observation).as_deref(),
                            action.as_ref(),
                        )?);
                    }
                    render_csv(&records)?
                }
                ExportFormat::Json => {
                    let mut items = Vec::new();
                    for observation in &nests {
                        let pictures = observations.list_pictures(&observation.id).await?;
                        let action = actions.get(&observation.id).await?;
                        items.push(observation_list_item(
                            observation,
                            species_name(observation).as_deref(),
                            &pictures,
                            action.as_ref(),
                        ));
                    }
                    serde_json::to_string_pretty(&items)?
                }
            }
        }
        ExportKind::Individuals => {
            let individuals = list_all(&observations, ObservationKind::Individual).await?;
            match format {
                ExportFormat::Csv => {
                    let mut records = Vec::new();
                    for observation in &individuals {
                        records.push(individual_csv_record(
                            observation,
                            species_name(observation).as_deref(),
                        )?);
                    }
                    render_csv(&records)?
                }
                ExportFormat::Json => {
                    let mut items = Vec::new();
                    for observation in &individuals {
                        let pictures = observations.list_pictures(&observation.id).await?;
                        items.push(observation_list_item(
                            observation,
                            species_name(observation).as_deref(),
                            &pictures,
                            None,
                        ));
                    }
                    serde_json::to_string_pretty(&items)?
                }
            }
        }
        ExportKind::Actions => {
            let all_actions = actions.list().await?;
            match format {
                ExportFormat::Csv => {
                    let records: Vec<_> = all_actions
                        .iter()
                        .map(management_action_csv_record)
                        .collect();
                    render_csv(&records)?
                }
                ExportFormat::Json => serde_json::to_string_pretty(&all_actions)?,
            }
        }
    };

    if let Some(path) = output_path {
        std::fs::write(path, rendered)?;
        println!("{}", path.display());
    } else {
        std::io::stdout().write_all(rendered.as_bytes())?;
    }

    Ok(())
}

async fn list_all(
    observations: &LibSqlObservationRepository<'_>,
    kind: ObservationKind,
) -> Result<Vec<Observation>, CliError> {
    const PAGE_SIZE: usize = 500;

    let mut all = Vec::new();
    let mut offset = 0usize;
    loop {
        let batch = observations.list(Some(kind), PAGE_SIZE, offset).await?;
        let count = batch.len();
        all.extend(batch);

        if count < PAGE_SIZE {
            break;
        }
        offset += count;
    }
    Ok(all)
}
