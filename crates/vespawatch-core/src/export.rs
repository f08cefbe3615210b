//! Shared export helpers: CSV reports and JSON list shapes.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{
    ManagementAction, Observation, ObservationDetails, ObservationKind, Picture,
};

/// Export output format shared by the API and CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

/// Display name for an observation's species: the raw remote name when no
/// local taxon matched, the registry name otherwise.
#[must_use]
pub fn species_display(observation: &Observation, species_name: Option<&str>) -> String {
    observation
        .remote_species
        .clone()
        .or_else(|| species_name.map(str::to_string))
        .unwrap_or_default()
}

/// One nest row of the CSV report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestCsvRecord {
    pub id: String,
    pub observation_time: String,
    pub species: String,
    pub latitude: f64,
    pub longitude: f64,
    pub origin: String,
    pub inaturalist_id: Option<i64>,
    pub inaturalist_species: String,
    pub community_confirmed: Option<bool>,
    pub created_at: i64,
    pub comments: String,
    pub size: String,
    pub height: String,
    pub expert_confirmed: Option<bool>,
    pub municipality: String,
    pub action_outcome: String,
}

/// One individual row of the CSV report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndividualCsvRecord {
    pub id: String,
    pub observation_time: String,
    pub species: String,
    pub latitude: f64,
    pub longitude: f64,
    pub origin: String,
    pub inaturalist_id: Option<i64>,
    pub inaturalist_species: String,
    pub community_confirmed: Option<bool>,
    pub created_at: i64,
    pub comments: String,
    pub individual_count: Option<i32>,
    pub behaviour: String,
}

/// One management action row of the CSV report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagementActionCsvRecord {
    pub nest_id: String,
    pub action_time: String,
    pub user: String,
    pub outcome: String,
    pub aftercare: String,
    pub product: String,
    pub method: String,
    pub duration_minutes: Option<i64>,
    pub number_of_persons: Option<i32>,
    pub comments: String,
    pub problems: String,
}

/// Build the CSV row for a nest observation.
pub fn nest_csv_record(
    observation: &Observation,
    species_name: Option<&str>,
    action: Option<&ManagementAction>,
) -> Result<NestCsvRecord> {
    let ObservationDetails::Nest(nest) = &observation.details else {
        return Err(Error::InvalidInput(format!(
            "Observation {} is not a nest",
            observation.id
        )));
    };

    Ok(NestCsvRecord {
        id: observation.id.as_str(),
        observation_time: observation.observation_time.to_rfc3339(),
        species: species_display(observation, species_name),
        latitude: observation.latitude,
        longitude: observation.longitude,
        origin: observation.origin.as_code().to_string(),
        inaturalist_id: observation.remote_id,
        inaturalist_species: observation.remote_species.clone().unwrap_or_default(),
        community_confirmed: observation.community_confirmed,
        created_at: observation.created_at,
        comments: observation.comments.clone(),
        size: nest.size.map(|size| size.label().to_string()).unwrap_or_default(),
        height: nest
            .height
            .map(|height| height.label().to_string())
            .unwrap_or_default(),
        expert_confirmed: nest.expert_confirmed,
        municipality: nest.municipality.clone().unwrap_or_default(),
        action_outcome: action
            .map(|action| action.outcome.label().to_string())
            .unwrap_or_default(),
    })
}

/// Build the CSV row for an individual observation.
pub fn individual_csv_record(
    observation: &Observation,
    species_name: Option<&str>,
) -> Result<IndividualCsvRecord> {
    let ObservationDetails::Individual(individual) = &observation.details else {
        return Err(Error::InvalidInput(format!(
            "Observation {} is not an individual",
            observation.id
        )));
    };

    Ok(IndividualCsvRecord {
        id: observation.id.as_str(),
        observation_time: observation.observation_time.to_rfc3339(),
        species: species_display(observation, species_name),
        latitude: observation.latitude,
        longitude: observation.longitude,
        origin: observation.origin.as_code().to_string(),
        inaturalist_id: observation.remote_id,
        inaturalist_species: observation.remote_species.clone().unwrap_or_default(),
        community_confirmed: observation.community_confirmed,
        created_at: observation.created_at,
        comments: observation.comments.clone(),
        individual_count: individual.count,
        behaviour: individual
            .behaviour
            .map(|behaviour| behaviour.label().to_string())
            .unwrap_or_default(),
    })
}

/// Build the CSV row for a management action.
#[must_use]
pub fn management_action_csv_record(action: &ManagementAction) -> ManagementActionCsvRecord {
    ManagementActionCsvRecord {
        nest_id: action.nest_id.as_str(),
        action_time: action.action_time.to_rfc3339(),
        user: action.user.clone(),
        outcome: action.outcome.label().to_string(),
        aftercare: action
            .aftercare
            .map(|aftercare| aftercare.label().to_string())
            .unwrap_or_default(),
        product: action
            .product
            .map(|product| product.label().to_string())
            .unwrap_or_default(),
        method: action
            .method
            .map(|method| method.label().to_string())
            .unwrap_or_default(),
        duration_minutes: action.duration_minutes,
        number_of_persons: action.number_of_persons,
        comments: action.comments.clone(),
        problems: action.problems.join("; "),
    }
}

/// Render serializable records as a CSV document with a header row.
pub fn render_csv<T: Serialize>(records: &[T]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer
            .serialize(record)
            .map_err(|error| Error::InvalidInput(format!("CSV write error: {error}")))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|error| Error::InvalidInput(format!("CSV flush error: {error}")))?;
    String::from_utf8(bytes)
        .map_err(|error| Error::InvalidInput(format!("CSV encoding error: {error}")))
}

/// Serializable observation representation used by the JSON list endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationListItem {
    pub id: String,
    pub species: String,
    pub subject: String,
    pub latitude: f64,
    pub longitude: f64,
    pub inaturalist_id: Option<i64>,
    /// Observation time in epoch milliseconds
    pub observation_time: i64,
    pub comments: String,
    pub image_filenames: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_code: Option<String>,
}

/// Convert an observation into its JSON list representation.
#[must_use]
pub fn observation_list_item(
    observation: &Observation,
    species_name: Option<&str>,
    pictures: &[Picture],
    action: Option<&ManagementAction>,
) -> ObservationListItem {
    ObservationListItem {
        id: observation.id.as_str(),
        species: species_display(observation, species_name),
        subject: observation.kind().as_code().to_string(),
        latitude: observation.latitude,
        longitude: observation.longitude,
        inaturalist_id: observation.remote_id,
        observation_time: observation.observation_time.timestamp_millis(),
        comments: observation.comments.clone(),
        image_filenames: pictures
            .iter()
            .map(|picture| picture.filename.clone())
            .collect(),
        action: match observation.kind() {
            ObservationKind::Nest => {
                action.map(|action| action.outcome.label().to_string())
            }
            ObservationKind::Individual => None,
        },
        action_code: match observation.kind() {
            ObservationKind::Nest => action.map(|action| action.outcome.as_code().to_string()),
            ObservationKind::Individual => None,
        },
    }
}
