//! Synchronization settings shared by the reconciliation engine and clients.

use std::collections::HashMap;
use std::env;

use chrono_tz::Tz;

use crate::error::{Error, Result};

/// Observation field ids used on the remote platform.
///
/// Field values travel as `{field_id, value}` pairs; these ids select the
/// entries the reconciliation engine cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservationFieldIds {
    /// Internal reference id set on pushed observations, so a remote record
    /// can be traced back to the local one.
    pub internal_id: i64,
    /// Evidence marker distinguishing "nest" sightings from "individual".
    pub evidence: i64,
    /// Behaviour label for individual sightings.
    pub behaviour: i64,
}

impl Default for ObservationFieldIds {
    fn default() -> Self {
        Self {
            internal_id: 9613,
            evidence: 9905,
            behaviour: 9906,
        }
    }
}

/// Configuration for synchronization with the remote naturalist platform.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Base URL of the remote platform API.
    pub api_base_url: String,
    /// Remote project the observations belong to.
    pub project_id: i64,
    /// Observation field ids on the remote platform.
    pub field_ids: ObservationFieldIds,
    /// Timezone assumed for naive observation times. All observations occur
    /// in the deployment region, so a single zone suffices.
    pub deployment_timezone: Tz,
    /// Timezone label sent with pushed observations.
    pub push_time_zone_label: String,
    /// Remote taxon ids counted as the target species when deriving the
    /// community-confirmation flag.
    pub target_pull_taxon_ids: Vec<i64>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            api_base_url: "https://www.inaturalist.org".to_string(),
            project_id: 22865,
            field_ids: ObservationFieldIds::default(),
            deployment_timezone: chrono_tz::Europe::Brussels,
            push_time_zone_label: "Brussels".to_string(),
            target_pull_taxon_ids: vec![119_019],
        }
    }
}

impl SyncSettings {
    /// Build settings from environment variables, falling back to the
    /// deployment defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    /// Build settings from an arbitrary lookup (testable variant of
    /// [`Self::from_env`]).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let api_base_url = value_or_default(&lookup, "INAT_API_BASE_URL", &defaults.api_base_url);
        let project_id =
            parse_or_default(&lookup, "VESPAWATCH_PROJECT_ID", defaults.project_id)?;
        let field_ids = ObservationFieldIds {
            internal_id: parse_or_default(
                &lookup,
                "VESPAWATCH_ID_FIELD_ID",
                defaults.field_ids.internal_id,
            )?,
            evidence: parse_or_default(
                &lookup,
                "VESPAWATCH_EVIDENCE_FIELD_ID",
                defaults.field_ids.evidence,
            )?,
            behaviour: parse_or_default(
                &lookup,
                "VESPAWATCH_BEHAVIOUR_FIELD_ID",
                defaults.field_ids.behaviour,
            )?,
        };

        let deployment_timezone = match lookup("VESPAWATCH_TIMEZONE") {
            Some(name) => name.trim().parse().map_err(|_| {
                Error::InvalidInput(format!("VESPAWATCH_TIMEZONE is not a valid zone: {name}"))
            })?,
            None => defaults.deployment_timezone,
        };
        let push_time_zone_label = value_or_default(
            &lookup,
            "VESPAWATCH_PUSH_TIMEZONE_LABEL",
            &defaults.push_time_zone_label,
        );

        let target_pull_taxon_ids = match lookup("VESPAWATCH_TARGET_TAXON_IDS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| {
                    part.parse::<i64>().map_err(|_| {
                        Error::InvalidInput(format!(
                            "VESPAWATCH_TARGET_TAXON_IDS contains a non-numeric id: {part}"
                        ))
                    })
                })
                .collect::<Result<Vec<i64>>>()?,
            None => defaults.target_pull_taxon_ids,
        };

        Ok(Self {
            api_base_url,
            project_id,
            field_ids,
            deployment_timezone,
            push_time_zone_label,
            target_pull_taxon_ids,
        })
    }
}

fn value_or_default(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: &str,
) -> String {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_or_default(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: i64,
) -> Result<i64> {
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::InvalidInput(format!("{name} must be numeric: {raw}"))),
        None => Ok(default),
    }
}
