//! Observation model: nests and individuals share one record shape with a
//! tagged details variant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

use super::taxon::TaxonId;

/// A unique identifier for an observation, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObservationId(Uuid);

impl ObservationId {
    /// Create a new unique observation ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ObservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ObservationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Where a record was first created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    /// Submitted through the local web forms
    Local,
    /// Imported from the remote platform during reconciliation
    Remote,
}

impl Origin {
    #[must_use]
    pub const fn as_code(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }

    pub fn from_code(code: &str) -> Result<Self> {
        match code {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            other => Err(Error::InvalidInput(format!("Unknown origin: {other}"))),
        }
    }
}

/// The two observation variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObservationKind {
    Nest,
    Individual,
}

impl ObservationKind {
    #[must_use]
    pub const fn as_code(self) -> &'static str {
        match self {
            Self::Nest => "nest",
            Self::Individual => "individual",
        }
    }

    pub fn from_code(code: &str) -> Result<Self> {
        match code {
            "nest" => Ok(Self::Nest),
            "individual" => Ok(Self::Individual),
            other => Err(Error::InvalidInput(format!(
                "Unknown observation kind: {other}"
            ))),
        }
    }
}

/// Nest size classes reported on the forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NestSize {
    LessThan25Cm,
    MoreThan25Cm,
}

impl NestSize {
    #[must_use]
    pub const fn as_code(self) -> &'static str {
        match self {
            Self::LessThan25Cm => "less_25_cm",
            Self::MoreThan25Cm => "more_25_cm",
        }
    }

    pub fn from_code(code: &str) -> Result<Self> {
        match code {
            "less_25_cm" => Ok(Self::LessThan25Cm),
            "more_25_cm" => Ok(Self::MoreThan25Cm),
            other => Err(Error::InvalidInput(format!("Unknown nest size: {other}"))),
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::LessThan25Cm => "Less than 25cm",
            Self::MoreThan25Cm => "More than 25cm",
        }
    }
}

/// Nest height classes reported on the forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NestHeight {
    BelowFourMeters,
    AboveFourMeters,
}

impl NestHeight {
    #[must_use]
    pub const fn as_code(self) -> &'static str {
        match self {
            Self::BelowFourMeters => "below_4_meters",
            Self::AboveFourMeters => "above_4_meters",
        }
    }

    pub fn from_code(code: &str) -> Result<Self> {
        match code {
            "below_4_meters" => Ok(Self::BelowFourMeters),
            "above_4_meters" => Ok(Self::AboveFourMeters),
            other => Err(Error::InvalidInput(format!("Unknown nest height: {other}"))),
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::BelowFourMeters => "Below 4 meters",
            Self::AboveFourMeters => "Above 4 meters",
        }
    }
}

/// Behaviour of an observed individual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Behaviour {
    Foraging,
    HuntingAtHive,
    AtFlower,
    Other,
}

impl Behaviour {
    #[must_use]
    pub const fn as_code(self) -> &'static str {
        match self {
            Self::Foraging => "FO",
            Self::HuntingAtHive => "HU",
            Self::AtFlower => "FL",
            Self::Other => "OT",
        }
    }

    pub fn from_code(code: &str) -> Result<Self> {
        match code {
            "FO" => Ok(Self::Foraging),
            "HU" => Ok(Self::HuntingAtHive),
            "FL" => Ok(Self::AtFlower),
            "OT" => Ok(Self::Other),
            other => Err(Error::InvalidInput(format!("Unknown behaviour: {other}"))),
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Foraging => "Foraging",
            Self::HuntingAtHive => "Hunting at hive",
            Self::AtFlower => "At flower",
            Self::Other => "Other",
        }
    }
}

/// Nest-specific attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestDetails {
    pub size: Option<NestSize>,
    pub height: Option<NestHeight>,
    /// Set once an expert confirmed the identification
    pub expert_confirmed: Option<bool>,
    pub municipality: Option<String>,
}

/// Individual-specific attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndividualDetails {
    pub count: Option<i32>,
    pub behaviour: Option<Behaviour>,
}

/// Variant-specific attributes carried alongside the common observation data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObservationDetails {
    Nest(NestDetails),
    Individual(IndividualDetails),
}

impl ObservationDetails {
    #[must_use]
    pub const fn kind(&self) -> ObservationKind {
        match self {
            Self::Nest(_) => ObservationKind::Nest,
            Self::Individual(_) => ObservationKind::Individual,
        }
    }
}

/// An observation of the target species: a nest or one-or-more individuals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Unique identifier
    pub id: ObservationId,
    /// Where the record was first created
    pub origin: Origin,
    /// Resolved local taxon; absent when only the raw remote name is known
    pub taxon_id: Option<TaxonId>,
    /// When the sighting happened (never in the future)
    pub observation_time: DateTime<Utc>,
    /// Latitude in [-90, 90]
    pub latitude: f64,
    /// Longitude in [-180, 180]
    pub longitude: f64,
    /// Free-text comments
    pub comments: String,
    /// Identifier on the remote platform, once synced
    pub remote_id: Option<i64>,
    /// Raw remote species name, stored when no local taxon matches
    pub remote_species: Option<String>,
    /// Community-sourced confirmation of the target species; None = unknown
    pub community_confirmed: Option<bool>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Variant-specific attributes
    pub details: ObservationDetails,
}

impl Observation {
    /// Create a new observation, validating the timestamp and coordinates.
    pub fn new(
        origin: Origin,
        taxon_id: Option<TaxonId>,
        observation_time: DateTime<Utc>,
        latitude: f64,
        longitude: f64,
        details: ObservationDetails,
    ) -> Result<Self> {
        validate_observation_time(observation_time)?;
        validate_coordinates(latitude, longitude)?;

        Ok(Self {
            id: ObservationId::new(),
            origin,
            taxon_id,
            observation_time,
            latitude,
            longitude,
            comments: String::new(),
            remote_id: None,
            remote_species: None,
            community_confirmed: None,
            created_at: Utc::now().timestamp_millis(),
            details,
        })
    }

    /// The variant tag of this observation.
    #[must_use]
    pub const fn kind(&self) -> ObservationKind {
        self.details.kind()
    }

    /// Whether this record exists on the remote platform.
    #[must_use]
    pub const fn exists_remotely(&self) -> bool {
        self.remote_id.is_some()
    }

    /// Local edits are only allowed before the record is pushed; once synced,
    /// remote data is authoritative and is always pulled, never pushed.
    #[must_use]
    pub fn can_be_edited_locally(&self) -> bool {
        self.origin == Origin::Local && self.remote_id.is_none()
    }
}

/// Validate that an observation timestamp is not in the future.
pub fn validate_observation_time(observation_time: DateTime<Utc>) -> Result<()> {
    if observation_time > Utc::now() {
        return Err(Error::InvalidInput(
            "Observation time cannot be in the future".into(),
        ));
    }
    Ok(())
}

/// Validate geographic coordinate ranges.
pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<()> {
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(Error::InvalidInput(format!(
            "Latitude out of range: {latitude}"
        )));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(Error::InvalidInput(format!(
            "Longitude out of range: {longitude}"
        )));
    }
    Ok(())
}

/// A unique identifier for a picture, using UUID v7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PictureId(Uuid);

impl PictureId {
    /// Create a new unique picture ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID.
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for PictureId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PictureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PictureId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Picture metadata attached to an observation; bytes live in the media store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Picture {
    /// Unique picture identifier
    pub id: PictureId,
    /// Parent observation identifier
    pub observation_id: ObservationId,
    /// Stable file name, unique per observation
    pub filename: String,
    /// Remote URL the picture was imported from, if any
    pub source_url: Option<String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
}

impl Picture {
    /// Create a new picture metadata record.
    pub fn new(
        observation_id: ObservationId,
        filename: impl Into<String>,
        source_url: Option<String>,
    ) -> Result<Self> {
        let filename = filename.into().trim().to_string();
        if filename.is_empty() {
            return Err(Error::InvalidInput(
                "Picture filename cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            id: PictureId::new(),
            observation_id,
            filename,
            source_url,
            created_at: Utc::now().timestamp_millis(),
        })
    }
}

/// A reconciliation anomaly flagged on an observation.
///
/// Warnings are additive and deduplicated by text; they surface to operators
/// instead of blocking sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationWarning {
    pub observation_id: ObservationId,
    pub text: String,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
}

/// A remote identifier awaiting deletion on the remote platform.
///
/// Created when a locally-originated, remote-synced observation is deleted;
/// removed only after the remote delete call succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDeletion {
    pub remote_id: i64,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
}
