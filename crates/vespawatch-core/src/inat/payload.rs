//! Typed remote observation payloads.

use serde::{Deserialize, Serialize};

use crate::config::{ObservationFieldIds, SyncSettings};
use crate::models::{Observation, ObservationDetails, ObservationKind};

/// Evidence field value marking a nest sighting.
pub const EVIDENCE_NEST: &str = "nest";
/// Evidence field value marking an individual sighting.
pub const EVIDENCE_INDIVIDUAL: &str = "individual";

/// One observation as returned by the remote platform.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteObservation {
    pub id: i64,
    pub taxon: RemoteTaxon,
    #[serde(default)]
    pub community_taxon_id: Option<i64>,
    #[serde(default)]
    pub observed_on_string: String,
    #[serde(default)]
    pub observed_time_zone: Option<String>,
    #[serde(default)]
    pub observed_on_details: Option<ObservedOnDetails>,
    #[serde(default)]
    pub geojson: Option<GeoJsonPoint>,
    #[serde(default)]
    pub ofvs: Vec<FieldValue>,
    #[serde(default)]
    pub photos: Vec<RemotePhoto>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub project_ids: Vec<i64>,
}

impl RemoteObservation {
    /// Coordinates as (latitude, longitude). The payload orders them
    /// [longitude, latitude], so they are transposed here and nowhere else.
    #[must_use]
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        let point = self.geojson.as_ref()?;
        match point.coordinates.as_slice() {
            [longitude, latitude, ..] => Some((*latitude, *longitude)),
            _ => None,
        }
    }
}

/// Taxon identification carried in a remote payload.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteTaxon {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

/// Date components supplied alongside the raw observed-on string.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ObservedOnDetails {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
}

/// GeoJSON point; coordinates are ordered [longitude, latitude].
#[derive(Debug, Clone, Deserialize)]
pub struct GeoJsonPoint {
    #[serde(default)]
    pub coordinates: Vec<f64>,
}

/// An observation field value pair.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldValue {
    pub field_id: i64,
    #[serde(default)]
    pub value: String,
}

/// A photo reference carried in a remote payload.
#[derive(Debug, Clone, Deserialize)]
pub struct RemotePhoto {
    pub url: String,
}

/// The observation fields the reconciliation engine reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationField {
    Evidence,
    InternalId,
    Behaviour,
}

/// Field values of one payload, resolved once against the configured ids.
#[derive(Debug, Clone, Default)]
pub struct FieldValueMap {
    evidence: Option<String>,
    internal_id: Option<String>,
    behaviour: Option<String>,
}

impl FieldValueMap {
    /// Build the map in a single pass over the payload's field values.
    #[must_use]
    pub fn new(field_values: &[FieldValue], ids: &ObservationFieldIds) -> Self {
        let mut map = Self::default();
        for field_value in field_values {
            let slot = if field_value.field_id == ids.evidence {
                &mut map.evidence
            } else if field_value.field_id == ids.internal_id {
                &mut map.internal_id
            } else if field_value.field_id == ids.behaviour {
                &mut map.behaviour
            } else {
                continue;
            };
            if slot.is_none() {
                *slot = Some(field_value.value.clone());
            }
        }
        map
    }

    /// Look up a field by its enumerated key.
    #[must_use]
    pub fn get(&self, field: ObservationField) -> Option<&str> {
        match field {
            ObservationField::Evidence => self.evidence.as_deref(),
            ObservationField::InternalId => self.internal_id.as_deref(),
            ObservationField::Behaviour => self.behaviour.as_deref(),
        }
    }

    /// Whether the payload's evidence field marks a nest sighting.
    #[must_use]
    pub fn is_nest_evidence(&self) -> bool {
        self.get(ObservationField::Evidence) == Some(EVIDENCE_NEST)
    }
}

/// An observation field value pushed to the remote platform.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationFieldValueAttribute {
    pub observation_field_id: i64,
    pub value: String,
}

/// The outbound observation payload.
///
/// `taxon_id` is only set when creating: once a record exists remotely, the
/// community identification is authoritative and is pulled, never pushed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taxon_id: Option<i64>,
    pub observed_on_string: String,
    pub time_zone: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub observation_field_values_attributes: Vec<ObservationFieldValueAttribute>,
}

impl ObservationPayload {
    /// Common ground for the data pushed to the remote platform.
    #[must_use]
    pub fn from_observation(observation: &Observation, settings: &SyncSettings) -> Self {
        let evidence = match observation.kind() {
            ObservationKind::Nest => EVIDENCE_NEST,
            ObservationKind::Individual => EVIDENCE_INDIVIDUAL,
        };

        let mut field_values = vec![
            ObservationFieldValueAttribute {
                observation_field_id: settings.field_ids.internal_id,
                value: observation.id.as_str(),
            },
            ObservationFieldValueAttribute {
                observation_field_id: settings.field_ids.evidence,
                value: evidence.to_string(),
            },
        ];

        if let ObservationDetails::Individual(individual) = &observation.details {
            if let Some(behaviour) = individual.behaviour {
                field_values.push(ObservationFieldValueAttribute {
                    observation_field_id: settings.field_ids.behaviour,
                    value: behaviour.label().to_string(),
                });
            }
        }

        Self {
            taxon_id: None,
            observed_on_string: observation.observation_time.to_rfc3339(),
            time_zone: settings.push_time_zone_label.clone(),
            description: observation.comments.clone(),
            latitude: observation.latitude,
            longitude: observation.longitude,
            observation_field_values_attributes: field_values,
        }
    }

    /// Set the create-only taxon push identifier.
    #[must_use]
    pub fn with_taxon(mut self, push_taxon_id: i64) -> Self {
        self.taxon_id = Some(push_taxon_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Behaviour, IndividualDetails, NestDetails, Origin};
    use chrono::{TimeZone, Utc};

    fn field_ids() -> ObservationFieldIds {
        ObservationFieldIds::default()
    }

    #[test]
    fn test_coordinates_are_transposed() {
        let payload: RemoteObservation = serde_json::from_value(serde_json::json!({
            "id": 1,
            "taxon": {"id": 119019, "name": "Vespa velutina"},
            "geojson": {"coordinates": [4.36, 50.65]}
        }))
        .unwrap();

        let (latitude, longitude) = payload.coordinates().unwrap();
        assert_eq!(latitude, 50.65);
        assert_eq!(longitude, 4.36);
    }

    #[test]
    fn test_field_value_map_lookup() {
        let ids = field_ids();
        let field_values = vec![
            FieldValue {
                field_id: ids.evidence,
                value: "nest".to_string(),
            },
            FieldValue {
                field_id: 12345,
                value: "ignored".to_string(),
            },
        ];

        let map = FieldValueMap::new(&field_values, &ids);
        assert!(map.is_nest_evidence());
        assert_eq!(map.get(ObservationField::Evidence), Some("nest"));
        assert_eq!(map.get(ObservationField::InternalId), None);
    }

    #[test]
    fn test_field_value_map_keeps_first_occurrence() {
        let ids = field_ids();
        let field_values = vec![
            FieldValue {
                field_id: ids.evidence,
                value: "nest".to_string(),
            },
            FieldValue {
                field_id: ids.evidence,
                value: "individual".to_string(),
            },
        ];

        let map = FieldValueMap::new(&field_values, &ids);
        assert_eq!(map.get(ObservationField::Evidence), Some("nest"));
    }

    #[test]
    fn test_payload_for_individual_includes_behaviour() {
        let settings = SyncSettings::default();
        let observation = Observation::new(
            Origin::Local,
            None,
            Utc.with_ymd_and_hms(2021, 6, 1, 10, 0, 0).unwrap(),
            50.8,
            4.4,
            ObservationDetails::Individual(IndividualDetails {
                count: None,
                behaviour: Some(Behaviour::Foraging),
            }),
        )
        .unwrap();

        let payload = ObservationPayload::from_observation(&observation, &settings);
        assert_eq!(payload.taxon_id, None);
        assert_eq!(payload.time_zone, "Brussels");
        assert_eq!(payload.observation_field_values_attributes.len(), 3);
        assert!(payload
            .observation_field_values_attributes
            .iter()
            .any(|attr| attr.value == "individual"));
        assert!(payload
            .observation_field_values_attributes
            .iter()
            .any(|attr| attr.value == "Foraging"));
    }

    #[test]
    fn test_payload_for_nest_marks_nest_evidence() {
        let settings = SyncSettings::default();
        let observation = Observation::new(
            Origin::Local,
            None,
            Utc.with_ymd_and_hms(2021, 6, 1, 10, 0, 0).unwrap(),
            50.8,
            4.4,
            ObservationDetails::Nest(NestDetails::default()),
        )
        .unwrap();

        let payload =
            ObservationPayload::from_observation(&observation, &settings).with_taxon(119_019);
        assert_eq!(payload.taxon_id, Some(119_019));
        assert_eq!(payload.observation_field_values_attributes.len(), 2);
        assert!(payload
            .observation_field_values_attributes
            .iter()
            .any(|attr| attr.value == "nest"));
    }
}
