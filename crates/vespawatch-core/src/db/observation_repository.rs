//! Observation repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{params, Connection, Row};

use crate::error::{Error, Result};
use crate::models::{
    Behaviour, IndividualDetails, NestDetails, NestHeight, NestSize, Observation,
    ObservationDetails, ObservationId, ObservationKind, ObservationWarning, Origin, Picture,
    PictureId,
};

const OBSERVATION_COLUMNS: &str = "id, kind, origin, taxon_id, observation_time, latitude, \
     longitude, comments, remote_id, remote_species, community_confirmed, created_at, \
     nest_size, nest_height, expert_confirmed, municipality, individual_count, behaviour";

/// Trait for observation storage operations
#[async_trait]
pub trait ObservationRepository {
    /// Persist a new observation
    async fn create(&self, observation: &Observation) -> Result<()>;

    /// Get an observation by ID
    async fn get(&self, id: &ObservationId) -> Result<Option<Observation>>;

    /// Get the observation synced with the given remote id
    async fn get_by_remote_id(&self, remote_id: i64) -> Result<Option<Observation>>;

    /// List observations, newest sighting first, optionally filtered by kind
    async fn list(
        &self,
        kind: Option<ObservationKind>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Observation>>;

    /// Overwrite an observation's stored fields
    async fn update(&self, observation: &Observation) -> Result<()>;

    /// Delete an observation (cascades to pictures, warnings and actions)
    async fn delete(&self, id: &ObservationId) -> Result<()>;

    /// List locally-created observations that have not been pushed yet
    async fn list_unpushed(&self) -> Result<Vec<Observation>>;

    /// Flag a warning on an observation; inserting the same text twice is a
    /// no-op
    async fn flag_warning(&self, id: &ObservationId, text: &str) -> Result<()>;

    /// List warnings flagged on an observation
    async fn list_warnings(&self, id: &ObservationId) -> Result<Vec<ObservationWarning>>;

    /// Attach picture metadata; a duplicate filename for the same observation
    /// is a no-op
    async fn attach_picture(&self, picture: &Picture) -> Result<()>;

    /// List pictures attached to an observation
    async fn list_pictures(&self, id: &ObservationId) -> Result<Vec<Picture>>;
}

/// libSQL implementation of `ObservationRepository`
pub struct LibSqlObservationRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlObservationRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse an observation from a database row
    fn parse_observation(row: &Row) -> Result<Observation> {
        let id: String = row.get(0)?;
        let kind = ObservationKind::from_code(&row.get::<String>(1)?)?;
        let origin = Origin::from_code(&row.get::<String>(2)?)?;
        let taxon_id = row
            .get::<Option<String>>(3)?
            .map(|raw| {
                raw.parse()
                    .map_err(|_| Error::Database(format!("Invalid taxon id: {raw}")))
            })
            .transpose()?;
        let observation_time = timestamp_from_millis(row.get(4)?)?;

        let details = match kind {
            ObservationKind::Nest => ObservationDetails::Nest(NestDetails {
                size: row
                    .get::<Option<String>>(12)?
                    .map(|code| NestSize::from_code(&code))
                    .transpose()?,
                height: row
                    .get::<Option<String>>(13)?
                    .map(|code| NestHeight::from_code(&code))
                    .transpose()?,
                expert_confirmed: row.get::<Option<i32>>(14)?.map(|flag| flag != 0),
                municipality: row.get::<Option<String>>(15)?,
            }),
            ObservationKind::Individual => ObservationDetails::Individual(IndividualDetails {
                count: row.get::<Option<i32>>(16)?,
                behaviour: row
                    .get::<Option<String>>(17)?
                    .map(|code| Behaviour::from_code(&code))
                    .transpose()?,
            }),
        };

        Ok(Observation {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("Invalid observation id: {id}")))?,
            origin,
            taxon_id,
            observation_time,
            latitude: row.get(5)?,
            longitude: row.get(6)?,
            comments: row.get(7)?,
            remote_id: row.get::<Option<i64>>(8)?,
            remote_species: row.get::<Option<String>>(9)?,
            community_confirmed: row.get::<Option<i32>>(10)?.map(|flag| flag != 0),
            created_at: row.get(11)?,
            details,
        })
    }

    fn detail_columns(
        observation: &Observation,
    ) -> (
        Option<String>,
        Option<String>,
        Option<i64>,
        Option<String>,
        Option<i64>,
        Option<String>,
    ) {
        match &observation.details {
            ObservationDetails::Nest(nest) => (
                nest.size.map(|size| size.as_code().to_string()),
                nest.height.map(|height| height.as_code().to_string()),
                nest.expert_confirmed.map(i64::from),
                nest.municipality.clone(),
                None,
                None,
            ),
            ObservationDetails::Individual(individual) => (
                None,
                None,
                None,
                None,
                individual.count.map(i64::from),
                individual
                    .behaviour
                    .map(|behaviour| behaviour.as_code().to_string()),
            ),
        }
    }
}

fn timestamp_from_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| Error::Database(format!("Invalid timestamp: {millis}")))
}

#[async_trait]
impl ObservationRepository for LibSqlObservationRepository<'_> {
    async fn create(&self, observation: &Observation) -> Result<()> {
        let (nest_size, nest_height, expert_confirmed, municipality, individual_count, behaviour) =
            Self::detail_columns(observation);

        self.conn
            .execute(
                "INSERT INTO observations (
                    id, kind, origin, taxon_id, observation_time, latitude, longitude,
                    comments, remote_id, remote_species, community_confirmed, created_at,
                    nest_size, nest_height, expert_confirmed, municipality,
                    individual_count, behaviour
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    observation.id.as_str(),
                    observation.kind().as_code(),
                    observation.origin.as_code(),
                    observation.taxon_id.map(|id| id.as_str()),
                    observation.observation_time.timestamp_millis(),
                    observation.latitude,
                    observation.longitude,
                    observation.comments.clone(),
                    observation.remote_id,
                    observation.remote_species.clone(),
                    observation.community_confirmed.map(i64::from),
                    observation.created_at,
                    nest_size,
                    nest_height,
                    expert_confirmed,
                    municipality,
                    individual_count,
                    behaviour
                ],
            )
            .await?;

        Ok(())
    }

    async fn get(&self, id: &ObservationId) -> Result<Option<Observation>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {OBSERVATION_COLUMNS} FROM observations WHERE id = ?"),
                params![id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_observation(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_by_remote_id(&self, remote_id: i64) -> Result<Option<Observation>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {OBSERVATION_COLUMNS} FROM observations WHERE remote_id = ?"),
                params![remote_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_observation(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        kind: Option<ObservationKind>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Observation>> {
        let mut rows = match kind {
            Some(kind) => {
                self.conn
                    .query(
                        &format!(
                            "SELECT {OBSERVATION_COLUMNS} FROM observations
                             WHERE kind = ?
                             ORDER BY observation_time DESC
                             LIMIT ? OFFSET ?"
                        ),
                        params![kind.as_code(), limit as i64, offset as i64],
                    )
                    .await?
            }
            None => {
                self.conn
                    .query(
                        &format!(
                            "SELECT {OBSERVATION_COLUMNS} FROM observations
                             ORDER BY observation_time DESC
                             LIMIT ? OFFSET ?"
                        ),
                        params![limit as i64, offset as i64],
                    )
                    .await?
            }
        };

        let mut observations = Vec::new();
        while let Some(row) = rows.next().await? {
            observations.push(Self::parse_observation(&row)?);
        }
        Ok(observations)
    }

    async fn update(&self, observation: &Observation) -> Result<()> {
        let (nest_size, nest_height, expert_confirmed, municipality, individual_count, behaviour) =
            Self::detail_columns(observation);

        let updated = self
            .conn
            .execute(
                "UPDATE observations SET
                    kind = ?, origin = ?, taxon_id = ?, observation_time = ?,
                    latitude = ?, longitude = ?, comments = ?, remote_id = ?,
                    remote_species = ?, community_confirmed = ?,
                    nest_size = ?, nest_height = ?, expert_confirmed = ?, municipality = ?,
                    individual_count = ?, behaviour = ?
                 WHERE id = ?",
                params![
                    observation.kind().as_code(),
                    observation.origin.as_code(),
                    observation.taxon_id.map(|id| id.as_str()),
                    observation.observation_time.timestamp_millis(),
                    observation.latitude,
                    observation.longitude,
                    observation.comments.clone(),
                    observation.remote_id,
                    observation.remote_species.clone(),
                    observation.community_confirmed.map(i64::from),
                    nest_size,
                    nest_height,
                    expert_confirmed,
                    municipality,
                    individual_count,
                    behaviour,
                    observation.id.as_str()
                ],
            )
            .await?;

        if updated == 0 {
            return Err(Error::NotFound(format!(
                "Observation {} does not exist",
                observation.id
            )));
        }
        Ok(())
    }

    async fn delete(&self, id: &ObservationId) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM observations WHERE id = ?",
                params![id.as_str()],
            )
            .await?;
        Ok(())
    }

    async fn list_unpushed(&self) -> Result<Vec<Observation>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {OBSERVATION_COLUMNS} FROM observations
                     WHERE origin = 'local' AND remote_id IS NULL
                     ORDER BY created_at"
                ),
                (),
            )
            .await?;

        let mut observations = Vec::new();
        while let Some(row) = rows.next().await? {
            observations.push(Self::parse_observation(&row)?);
        }
        Ok(observations)
    }

    async fn flag_warning(&self, id: &ObservationId, text: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO observation_warnings (observation_id, text, created_at)
                 VALUES (?, ?, ?)",
                params![id.as_str(), text, Utc::now().timestamp_millis()],
            )
            .await?;
        Ok(())
    }

    async fn list_warnings(&self, id: &ObservationId) -> Result<Vec<ObservationWarning>> {
        let mut rows = self
            .conn
            .query(
                "SELECT observation_id, text, created_at FROM observation_warnings
                 WHERE observation_id = ? ORDER BY created_at",
                params![id.as_str()],
            )
            .await?;

        let mut warnings = Vec::new();
        while let Some(row) = rows.next().await? {
            let observation_id: String = row.get(0)?;
            warnings.push(ObservationWarning {
                observation_id: observation_id.parse().map_err(|_| {
                    Error::Database(format!("Invalid observation id: {observation_id}"))
                })?,
                text: row.get(1)?,
                created_at: row.get(2)?,
            });
        }
        Ok(warnings)
    }

    async fn attach_picture(&self, picture: &Picture) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO pictures (id, observation_id, filename, source_url, created_at)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    picture.id.as_str(),
                    picture.observation_id.as_str(),
                    picture.filename.clone(),
                    picture.source_url.clone(),
                    picture.created_at
                ],
            )
            .await?;
        Ok(())
    }

    async fn list_pictures(&self, id: &ObservationId) -> Result<Vec<Picture>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, observation_id, filename, source_url, created_at FROM pictures
                 WHERE observation_id = ? ORDER BY created_at",
                params![id.as_str()],
            )
            .await?;

        let mut pictures = Vec::new();
        while let Some(row) = rows.next().await? {
            let picture_id: String = row.get(0)?;
            let observation_id: String = row.get(1)?;
            pictures.push(Picture {
                id: picture_id
                    .parse::<PictureId>()
                    .map_err(|_| Error::Database(format!("Invalid picture id: {picture_id}")))?,
                observation_id: observation_id.parse().map_err(|_| {
                    Error::Database(format!("Invalid observation id: {observation_id}"))
                })?,
                filename: row.get(2)?,
                source_url: row.get::<Option<String>>(3)?,
                created_at: row.get(4)?,
            });
        }
        Ok(pictures)
    }
}
