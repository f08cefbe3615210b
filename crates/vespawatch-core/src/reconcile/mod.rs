//! Reconciliation engine: keeps local observations and remote platform
//! records in agreement.
//!
//! Inbound, a remote payload either creates a local record, updates the
//! record synced with its remote id, or flags a warning. Outbound, locally
//! created records are pushed (create + pictures) and locally deleted records
//! are removed remotely through the pending-deletion ledger.

mod photos;
mod time;

pub use photos::derive_photo_filename;
pub use time::{assume_deployment_timezone, observation_time_from_payload};

use libsql::Connection;

use crate::config::SyncSettings;
use crate::db::{
    DeletionLedgerRepository, LibSqlDeletionLedgerRepository, LibSqlObservationRepository,
    LibSqlTaxonRepository, ObservationRepository, TaxonRepository,
};
use crate::error::{Error, Result};
use crate::inat::{
    FieldValueMap, ObservationPayload, PhotoFetcher, RemoteClient, RemoteCredentials,
    RemoteObservation,
};
use crate::media::MediaStore;
use crate::models::{
    validate_coordinates, IndividualDetails, NestDetails, Observation, ObservationDetails,
    ObservationKind, Origin, Picture,
};

/// Warning: a local nest is recorded as an individual on the remote platform.
pub const WARNING_INDIVIDUAL_AT_INATURALIST: &str = "individual at inaturalist";
/// Warning: a local individual is recorded as a nest on the remote platform.
pub const WARNING_NEST_AT_INATURALIST: &str = "nest at inaturalist";
/// Warning: the remote record no longer belongs to the expected project.
pub const WARNING_NOT_IN_PROJECT: &str = "not in vespawatch project";
/// Warning: the remote record's taxon id is not known locally.
pub const WARNING_UNKNOWN_TAXON: &str = "unknown taxon";

/// Delete a local observation. Deleting a locally-originated record that
/// exists remotely queues its remote id in the pending-deletion ledger;
/// ledger entry and local delete happen in one transaction, so a failed
/// enqueue never orphans a remote record.
pub async fn delete_observation(conn: &Connection, observation: &Observation) -> Result<()> {
    let observations = LibSqlObservationRepository::new(conn);
    let ledger = LibSqlDeletionLedgerRepository::new(conn);

    if observation.origin == Origin::Local {
        if let Some(remote_id) = observation.remote_id {
            conn.execute("BEGIN TRANSACTION", ()).await?;
            let outcome = async {
                ledger.enqueue(remote_id).await?;
                observations.delete(&observation.id).await?;
                Ok::<(), Error>(())
            }
            .await;

            return match outcome {
                Ok(()) => {
                    conn.execute("COMMIT", ()).await?;
                    Ok(())
                }
                Err(error) => {
                    conn.execute("ROLLBACK", ()).await.ok();
                    Err(error)
                }
            };
        }
    }

    observations.delete(&observation.id).await
}

/// The reconciliation engine.
///
/// Failures abort the single payload being processed, never the batch; the
/// caller iterating over payloads decides whether to log and continue.
pub struct ReconciliationEngine<'a> {
    conn: &'a Connection,
    settings: &'a SyncSettings,
    media: &'a MediaStore,
    client: &'a dyn RemoteClient,
    photos: &'a dyn PhotoFetcher,
}

impl<'a> ReconciliationEngine<'a> {
    pub const fn new(
        conn: &'a Connection,
        settings: &'a SyncSettings,
        media: &'a MediaStore,
        client: &'a dyn RemoteClient,
        photos: &'a dyn PhotoFetcher,
    ) -> Self {
        Self {
            conn,
            settings,
            media,
            client,
            photos,
        }
    }

    /// Reconcile one remote payload: update the record synced with its remote
    /// id, or create a new one.
    pub async fn apply(&self, payload: &RemoteObservation) -> Result<Observation> {
        let observations = LibSqlObservationRepository::new(self.conn);
        match observations.get_by_remote_id(payload.id).await? {
            Some(existing) => self.update_from_remote(existing, payload).await,
            None => self.reconcile_from_remote(payload).await,
        }
    }

    /// Create a local observation from a remote payload.
    ///
    /// Nothing is persisted when taxon resolution or date parsing fails: the
    /// create step and photo attachment are one unit.
    pub async fn reconcile_from_remote(
        &self,
        payload: &RemoteObservation,
    ) -> Result<Observation> {
        let observations = LibSqlObservationRepository::new(self.conn);
        let taxa = LibSqlTaxonRepository::new(self.conn);

        let observation_time =
            observation_time_from_payload(payload, self.settings.deployment_timezone)?;
        let taxon = taxa.resolve_pull_taxon_id(payload.taxon.id).await?;
        let (latitude, longitude) = payload.coordinates().ok_or_else(|| {
            Error::InvalidInput(format!("Payload {} carries no coordinates", payload.id))
        })?;

        let field_values = FieldValueMap::new(&payload.ofvs, &self.settings.field_ids);
        let details = if field_values.is_nest_evidence() {
            ObservationDetails::Nest(NestDetails::default())
        } else {
            // Absent or non-nest evidence defaults to an individual sighting
            ObservationDetails::Individual(IndividualDetails::default())
        };

        let mut observation = Observation::new(
            Origin::Remote,
            Some(taxon.id),
            observation_time,
            latitude,
            longitude,
            details,
        )?;
        observation.remote_id = Some(payload.id);
        observation.community_confirmed = self.community_confirmation(payload);

        observations.create(&observation).await?;
        tracing::debug!(
            remote_id = payload.id,
            kind = observation.kind().as_code(),
            "Created observation from remote payload"
        );

        for photo in &payload.photos {
            self.attach_photo(&observation, &photo.url).await?;
        }

        Ok(observation)
    }

    /// Update an existing local observation from a fresh payload for the same
    /// remote id. Remote data is authoritative once synced.
    pub async fn update_from_remote(
        &self,
        mut observation: Observation,
        payload: &RemoteObservation,
    ) -> Result<Observation> {
        let observations = LibSqlObservationRepository::new(self.conn);
        let taxa = LibSqlTaxonRepository::new(self.conn);

        let field_values = FieldValueMap::new(&payload.ofvs, &self.settings.field_ids);
        let nest_evidence = field_values.is_nest_evidence();

        match observation.kind() {
            ObservationKind::Nest if !nest_evidence => {
                observations
                    .flag_warning(&observation.id, WARNING_INDIVIDUAL_AT_INATURALIST)
                    .await?;
            }
            ObservationKind::Individual if nest_evidence => match observation.origin {
                Origin::Local => {
                    // An unintended mismatch in our own submission; needs a
                    // manual fix rather than an automatic rewrite
                    observations
                        .flag_warning(&observation.id, WARNING_NEST_AT_INATURALIST)
                        .await?;
                }
                Origin::Remote => {
                    return self.rematerialize_as_nest(&observation, payload).await;
                }
            },
            _ => {}
        }

        observation.community_confirmed = self.community_confirmation(payload);

        // Pull photos only while the record has none; once any photo exists,
        // repeated syncs must not import duplicates
        if observations
            .list_pictures(&observation.id)
            .await?
            .is_empty()
        {
            for photo in &payload.photos {
                self.attach_photo(&observation, &photo.url).await?;
            }
        }

        let (latitude, longitude) = payload.coordinates().ok_or_else(|| {
            Error::InvalidInput(format!("Payload {} carries no coordinates", payload.id))
        })?;
        validate_coordinates(latitude, longitude)?;
        observation.latitude = latitude;
        observation.longitude = longitude;

        observation.observation_time =
            observation_time_from_payload(payload, self.settings.deployment_timezone)?;
        observation.comments = payload.description.clone().unwrap_or_default();

        match taxa.resolve_pull_taxon_id(payload.taxon.id).await {
            Ok(taxon) => {
                observation.taxon_id = Some(taxon.id);
                observation.remote_species = None;
            }
            Err(Error::TaxonMatch(_)) => {
                // Degraded but non-fatal: keep the raw remote name instead
                observation.taxon_id = None;
                observation.remote_species = Some(payload.taxon.name.clone());
            }
            Err(error) => return Err(error),
        }

        observations.update(&observation).await?;
        Ok(observation)
    }

    /// Replace a remote-origin individual with the nest its payload now
    /// describes. The stale record is only dropped when the create path
    /// succeeds; otherwise it is kept and the error re-raised.
    async fn rematerialize_as_nest(
        &self,
        observation: &Observation,
        payload: &RemoteObservation,
    ) -> Result<Observation> {
        let observations = LibSqlObservationRepository::new(self.conn);

        self.conn.execute("BEGIN TRANSACTION", ()).await?;
        observations.delete(&observation.id).await?;
        match self.reconcile_from_remote(payload).await {
            Ok(created) => {
                self.conn.execute("COMMIT", ()).await?;
                tracing::info!(
                    remote_id = payload.id,
                    "Rematerialized individual as nest"
                );
                Ok(created)
            }
            Err(error) => {
                self.conn.execute("ROLLBACK", ()).await.ok();
                Err(error)
            }
        }
    }

    /// Check whether a payload still belongs to the expected project and its
    /// taxon is known locally; mismatches flag warnings without altering
    /// other fields.
    pub async fn check_membership(&self, payload: &RemoteObservation) -> Result<()> {
        let observations = LibSqlObservationRepository::new(self.conn);
        let taxa = LibSqlTaxonRepository::new(self.conn);

        let Some(observation) = observations.get_by_remote_id(payload.id).await? else {
            return Ok(());
        };

        if !payload.project_ids.contains(&self.settings.project_id) {
            observations
                .flag_warning(&observation.id, WARNING_NOT_IN_PROJECT)
                .await?;
        }

        match taxa.resolve_pull_taxon_id(payload.taxon.id).await {
            Ok(_) => {}
            Err(Error::TaxonMatch(_)) => {
                observations
                    .flag_warning(&observation.id, WARNING_UNKNOWN_TAXON)
                    .await?;
            }
            Err(error) => return Err(error),
        }

        Ok(())
    }

    /// Tri-state community confirmation of the target species. Unknown when
    /// the payload carries no community identification.
    #[must_use]
    pub fn community_confirmation(&self, payload: &RemoteObservation) -> Option<bool> {
        payload.community_taxon_id.map(|community_taxon_id| {
            self.settings
                .target_pull_taxon_ids
                .contains(&community_taxon_id)
        })
    }

    /// Attach the photo at `url` unless a picture with the derived filename
    /// already exists on the record.
    async fn attach_photo(&self, observation: &Observation, url: &str) -> Result<()> {
        let observations = LibSqlObservationRepository::new(self.conn);
        let filename = derive_photo_filename(url);

        let existing = observations.list_pictures(&observation.id).await?;
        if existing.iter().any(|picture| picture.filename == filename) {
            return Ok(());
        }

        let bytes = self.photos.fetch_bytes(url).await?;
        self.media.save(&filename, &bytes)?;
        observations
            .attach_picture(&Picture::new(
                observation.id,
                filename,
                Some(url.to_string()),
            )?)
            .await?;
        Ok(())
    }

    /// Push a locally-created observation to the remote platform, then push
    /// its pictures using the returned remote id.
    ///
    /// When the create call fails no remote id is stored, leaving the record
    /// eligible for retry on the next push cycle.
    pub async fn push_to_remote(
        &self,
        observation: &mut Observation,
        credentials: &RemoteCredentials,
    ) -> Result<()> {
        let observations = LibSqlObservationRepository::new(self.conn);
        let taxa = LibSqlTaxonRepository::new(self.conn);

        if observation.origin != Origin::Local {
            return Err(Error::InvalidInput(
                "Only locally-created observations are pushed".to_string(),
            ));
        }
        if observation.remote_id.is_some() {
            return Err(Error::InvalidInput(format!(
                "Observation {} was already pushed",
                observation.id
            )));
        }
        let taxon_id = observation.taxon_id.ok_or_else(|| {
            Error::InvalidInput("Cannot push an observation without a taxon".to_string())
        })?;
        let taxon = taxa
            .get(&taxon_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Taxon {taxon_id} does not exist")))?;

        let payload = ObservationPayload::from_observation(observation, self.settings)
            .with_taxon(taxon.push_taxon_id);

        let remote_id = self.client.create(&payload, credentials).await?;
        observation.remote_id = Some(remote_id);
        observations.update(observation).await?;
        tracing::info!(remote_id, "Pushed observation to remote platform");

        self.push_pictures(observation, credentials).await?;
        Ok(())
    }

    /// Push all attached pictures of a remote-synced observation.
    ///
    /// Not idempotent remotely, so this runs exactly once per picture:
    /// immediately after create, never on later syncs.
    async fn push_pictures(
        &self,
        observation: &Observation,
        credentials: &RemoteCredentials,
    ) -> Result<()> {
        let observations = LibSqlObservationRepository::new(self.conn);
        let Some(remote_id) = observation.remote_id else {
            return Ok(());
        };

        for picture in observations.list_pictures(&observation.id).await? {
            let bytes = self.media.load(&picture.filename)?;
            self.client
                .attach_photo(remote_id, &picture.filename, bytes, credentials)
                .await?;
        }
        Ok(())
    }

    /// Delete a local observation, queueing a ledger entry as needed.
    pub async fn delete_observation(&self, observation: &Observation) -> Result<()> {
        delete_observation(self.conn, observation).await
    }

    /// Issue remote deletes for queued ledger entries, removing each entry
    /// only after its remote call succeeds. Entries whose delete fails stay
    /// queued for the next sweep.
    pub async fn process_deletion_ledger(
        &self,
        credentials: &RemoteCredentials,
    ) -> Result<usize> {
        let ledger = LibSqlDeletionLedgerRepository::new(self.conn);
        let mut deleted = 0;

        for entry in ledger.list().await? {
            match self.client.delete(entry.remote_id, credentials).await {
                Ok(()) => {
                    ledger.remove(entry.remote_id).await?;
                    deleted += 1;
                }
                Err(error) => {
                    tracing::warn!(
                        remote_id = entry.remote_id,
                        "Remote delete failed, entry stays queued: {error}"
                    );
                }
            }
        }

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        Database, LibSqlDeletionLedgerRepository, LibSqlObservationRepository,
        LibSqlTaxonRepository,
    };
    use crate::inat::{FieldValue, GeoJsonPoint, RemotePhoto, RemoteTaxon};
    use crate::models::{Behaviour, Taxon};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const EVIDENCE_FIELD_ID: i64 = 9905;

    #[derive(Default)]
    struct MockRemoteClient {
        /// Remote id returned by create; None makes create fail
        create_result: Mutex<Option<i64>>,
        created: Mutex<Vec<ObservationPayload>>,
        attached_photos: Mutex<Vec<(i64, String)>>,
        deleted: Mutex<Vec<i64>>,
        fail_deletes: Mutex<bool>,
    }

    #[async_trait]
    impl RemoteClient for MockRemoteClient {
        async fn fetch(&self, _observation_id: i64) -> Result<RemoteObservation> {
            Err(Error::Remote("fetch not used in this test".to_string()))
        }

        async fn fetch_project_observations(
            &self,
            _project_id: i64,
        ) -> Result<Vec<RemoteObservation>> {
            Ok(Vec::new())
        }

        async fn create(
            &self,
            payload: &ObservationPayload,
            _credentials: &RemoteCredentials,
        ) -> Result<i64> {
            let remote_id = self
                .create_result
                .lock()
                .unwrap()
                .ok_or_else(|| Error::Remote("create rejected (503)".to_string()))?;
            self.created.lock().unwrap().push(payload.clone());
            Ok(remote_id)
        }

        async fn update(
            &self,
            _remote_id: i64,
            _payload: &ObservationPayload,
            _credentials: &RemoteCredentials,
        ) -> Result<()> {
            Ok(())
        }

        async fn attach_photo(
            &self,
            remote_id: i64,
            filename: &str,
            _bytes: Vec<u8>,
            _credentials: &RemoteCredentials,
        ) -> Result<()> {
            self.attached_photos
                .lock()
                .unwrap()
                .push((remote_id, filename.to_string()));
            Ok(())
        }

        async fn delete(&self, remote_id: i64, _credentials: &RemoteCredentials) -> Result<()> {
            if *self.fail_deletes.lock().unwrap() {
                return Err(Error::Remote("delete rejected (503)".to_string()));
            }
            self.deleted.lock().unwrap().push(remote_id);
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockPhotoFetcher {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl PhotoFetcher for MockPhotoFetcher {
        async fn fetch_bytes(&self, _url: &str) -> Result<Vec<u8>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(b"jpeg-bytes".to_vec())
        }
    }

    struct TestHarness {
        db: Database,
        settings: SyncSettings,
        // Held so the media directory outlives the store
        _media_dir: tempfile::TempDir,
        media: MediaStore,
        client: MockRemoteClient,
        photos: MockPhotoFetcher,
    }

    impl TestHarness {
        async fn new() -> Self {
            let db = Database::open_in_memory().await.unwrap();
            let media_dir = tempfile::tempdir().unwrap();
            let media = MediaStore::open(media_dir.path()).unwrap();
            Self {
                db,
                settings: SyncSettings::default(),
                _media_dir: media_dir,
                media,
                client: MockRemoteClient::default(),
                photos: MockPhotoFetcher::default(),
            }
        }

        fn engine(&self) -> ReconciliationEngine<'_> {
            ReconciliationEngine::new(
                self.db.connection(),
                &self.settings,
                &self.media,
                &self.client,
                &self.photos,
            )
        }

        async fn seed_taxon(&self) -> Taxon {
            let taxa = LibSqlTaxonRepository::new(self.db.connection());
            let taxon =
                Taxon::new("Vespa velutina", None, 119_019, vec![119_019]).unwrap();
            taxa.create(&taxon).await.unwrap();
            taxon
        }
    }

    fn credentials() -> RemoteCredentials {
        RemoteCredentials::new("test-token").unwrap()
    }

    fn payload(remote_id: i64, evidence: Option<&str>) -> RemoteObservation {
        RemoteObservation {
            id: remote_id,
            taxon: RemoteTaxon {
                id: 119_019,
                name: "Vespa velutina".to_string(),
            },
            community_taxon_id: None,
            observed_on_string: "2021-06-01 10:00".to_string(),
            observed_time_zone: Some("Europe/Brussels".to_string()),
            observed_on_details: None,
            geojson: Some(GeoJsonPoint {
                coordinates: vec![4.4, 50.8],
            }),
            ofvs: evidence
                .map(|value| {
                    vec![FieldValue {
                        field_id: EVIDENCE_FIELD_ID,
                        value: value.to_string(),
                    }]
                })
                .unwrap_or_default(),
            photos: Vec::new(),
            description: None,
            project_ids: vec![SyncSettings::default().project_id],
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_nest_evidence_creates_a_nest() {
        let harness = TestHarness::new().await;
        harness.seed_taxon().await;
        let engine = harness.engine();

        let created = engine
            .reconcile_from_remote(&payload(99, Some("nest")))
            .await
            .unwrap();

        assert_eq!(created.kind(), ObservationKind::Nest);
        assert_eq!(created.origin, Origin::Remote);
        assert_eq!(created.remote_id, Some(99));
        assert_eq!(created.latitude, 50.8);
        assert_eq!(created.longitude, 4.4);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_or_other_evidence_creates_an_individual() {
        let harness = TestHarness::new().await;
        harness.seed_taxon().await;
        let engine = harness.engine();

        let no_evidence = engine
            .reconcile_from_remote(&payload(1, None))
            .await
            .unwrap();
        assert_eq!(no_evidence.kind(), ObservationKind::Individual);

        let other_evidence = engine
            .reconcile_from_remote(&payload(2, Some("individual")))
            .await
            .unwrap();
        assert_eq!(other_evidence.kind(), ObservationKind::Individual);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_taxon_creates_nothing() {
        let harness = TestHarness::new().await;
        let engine = harness.engine();

        let error = engine
            .reconcile_from_remote(&payload(99, Some("nest")))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::TaxonMatch(119_019)));

        let observations = LibSqlObservationRepository::new(harness.db.connection());
        assert!(observations.list(None, 10, 0).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unparseable_date_creates_nothing() {
        let harness = TestHarness::new().await;
        harness.seed_taxon().await;
        let engine = harness.engine();

        let mut bad_date = payload(99, Some("nest"));
        bad_date.observed_on_string = "ergens in juni".to_string();
        bad_date.observed_on_details = None;

        let error = engine.reconcile_from_remote(&bad_date).await.unwrap_err();
        assert!(matches!(error, Error::ParseDate(_)));

        let observations = LibSqlObservationRepository::new(harness.db.connection());
        assert!(observations.list(None, 10, 0).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_photo_attachment_is_idempotent() {
        let harness = TestHarness::new().await;
        harness.seed_taxon().await;
        let engine = harness.engine();

        let mut with_photos = payload(99, Some("nest"));
        let url = "https://static.inaturalist.org/photos/1234/square.jpg?1560";
        with_photos.photos = vec![
            RemotePhoto {
                url: url.to_string(),
            },
            RemotePhoto {
                url: url.to_string(),
            },
        ];

        let created = engine.reconcile_from_remote(&with_photos).await.unwrap();

        let observations = LibSqlObservationRepository::new(harness.db.connection());
        let pictures = observations.list_pictures(&created.id).await.unwrap();
        assert_eq!(pictures.len(), 1);
        assert_eq!(pictures[0].filename, "1234_large.jpg");
        assert_eq!(harness.photos.fetches.load(Ordering::SeqCst), 1);
        assert!(harness.media.exists("1234_large.jpg"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_repeated_sync_pulls_no_further_photos() {
        let harness = TestHarness::new().await;
        harness.seed_taxon().await;
        let engine = harness.engine();

        let mut with_photo = payload(99, Some("nest"));
        with_photo.photos = vec![RemotePhoto {
            url: "https://static.inaturalist.org/photos/1/square.jpg".to_string(),
        }];
        let created = engine.apply(&with_photo).await.unwrap();

        // Second sync carries an additional photo; the record already has one
        // picture, so nothing more is pulled
        with_photo.photos.push(RemotePhoto {
            url: "https://static.inaturalist.org/photos/2/square.jpg".to_string(),
        });
        engine.apply(&with_photo).await.unwrap();

        let observations = LibSqlObservationRepository::new(harness.db.connection());
        assert_eq!(
            observations.list_pictures(&created.id).await.unwrap().len(),
            1
        );
        assert_eq!(harness.photos.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_round_trip_push_then_update_does_not_duplicate() {
        let harness = TestHarness::new().await;
        let taxon = harness.seed_taxon().await;
        *harness.client.create_result.lock().unwrap() = Some(42);
        let engine = harness.engine();

        let observations = LibSqlObservationRepository::new(harness.db.connection());
        let mut observation = Observation::new(
            Origin::Local,
            Some(taxon.id),
            Utc.with_ymd_and_hms(2021, 6, 1, 10, 0, 0).unwrap(),
            50.8,
            4.4,
            ObservationDetails::Nest(NestDetails::default()),
        )
        .unwrap();
        observations.create(&observation).await.unwrap();

        engine
            .push_to_remote(&mut observation, &credentials())
            .await
            .unwrap();
        assert_eq!(observation.remote_id, Some(42));

        let mut update = payload(42, Some("nest"));
        update.description = Some("community note".to_string());
        let updated = engine.apply(&update).await.unwrap();

        assert_eq!(updated.id, observation.id);
        assert_eq!(updated.comments, "community note");
        assert_eq!(observations.list(None, 10, 0).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_push_stores_no_remote_id() {
        let harness = TestHarness::new().await;
        let taxon = harness.seed_taxon().await;
        // create_result stays None: the create call fails
        let engine = harness.engine();

        let observations = LibSqlObservationRepository::new(harness.db.connection());
        let mut observation = Observation::new(
            Origin::Local,
            Some(taxon.id),
            Utc.with_ymd_and_hms(2021, 6, 1, 10, 0, 0).unwrap(),
            50.8,
            4.4,
            ObservationDetails::Nest(NestDetails::default()),
        )
        .unwrap();
        observations.create(&observation).await.unwrap();

        let error = engine
            .push_to_remote(&mut observation, &credentials())
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Remote(_)));
        assert_eq!(observation.remote_id, None);

        // Still eligible for the next push cycle
        assert_eq!(observations.list_unpushed().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_push_sends_create_payload_and_pictures() {
        let harness = TestHarness::new().await;
        let taxon = harness.seed_taxon().await;
        *harness.client.create_result.lock().unwrap() = Some(7);
        let engine = harness.engine();

        let observations = LibSqlObservationRepository::new(harness.db.connection());
        let mut observation = Observation::new(
            Origin::Local,
            Some(taxon.id),
            Utc.with_ymd_and_hms(2021, 6, 1, 10, 0, 0).unwrap(),
            50.8,
            4.4,
            ObservationDetails::Individual(IndividualDetails {
                count: Some(1),
                behaviour: Some(Behaviour::AtFlower),
            }),
        )
        .unwrap();
        observations.create(&observation).await.unwrap();

        harness.media.save("mine.jpg", b"local-bytes").unwrap();
        observations
            .attach_picture(&Picture::new(observation.id, "mine.jpg", None).unwrap())
            .await
            .unwrap();

        engine
            .push_to_remote(&mut observation, &credentials())
            .await
            .unwrap();

        let created = harness.client.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].taxon_id, Some(taxon.push_taxon_id));
        assert!(created[0]
            .observation_field_values_attributes
            .iter()
            .any(|attr| attr.value == "At flower"));

        let attached = harness.client.attached_photos.lock().unwrap();
        assert_eq!(attached.as_slice(), &[(7, "mine.jpg".to_string())]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_degrades_to_raw_species_name_on_unknown_taxon() {
        let harness = TestHarness::new().await;
        harness.seed_taxon().await;
        let engine = harness.engine();

        let created = engine.apply(&payload(99, None)).await.unwrap();
        assert!(created.taxon_id.is_some());

        let mut foreign_taxon = payload(99, None);
        foreign_taxon.taxon = RemoteTaxon {
            id: 54_327,
            name: "Vespa crabro".to_string(),
        };
        let updated = engine.apply(&foreign_taxon).await.unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.taxon_id, None);
        assert_eq!(updated.remote_species, Some("Vespa crabro".to_string()));

        // A later payload with a known taxon restores the reference
        let restored = engine.apply(&payload(99, None)).await.unwrap();
        assert!(restored.taxon_id.is_some());
        assert_eq!(restored.remote_species, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_nest_with_individual_evidence_flags_one_warning() {
        let harness = TestHarness::new().await;
        harness.seed_taxon().await;
        let engine = harness.engine();

        let created = engine
            .reconcile_from_remote(&payload(99, Some("nest")))
            .await
            .unwrap();

        let individual_evidence = payload(99, Some("individual"));
        engine.apply(&individual_evidence).await.unwrap();
        engine.apply(&individual_evidence).await.unwrap();

        let observations = LibSqlObservationRepository::new(harness.db.connection());
        let warnings = observations.list_warnings(&created.id).await.unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].text, WARNING_INDIVIDUAL_AT_INATURALIST);

        // Still a nest: evidence mismatches are flagged, not rewritten
        let kept = observations.get(&created.id).await.unwrap().unwrap();
        assert_eq!(kept.kind(), ObservationKind::Nest);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_local_individual_with_nest_evidence_flags_warning() {
        let harness = TestHarness::new().await;
        let taxon = harness.seed_taxon().await;
        let engine = harness.engine();

        let observations = LibSqlObservationRepository::new(harness.db.connection());
        let mut observation = Observation::new(
            Origin::Local,
            Some(taxon.id),
            Utc.with_ymd_and_hms(2021, 6, 1, 10, 0, 0).unwrap(),
            50.8,
            4.4,
            ObservationDetails::Individual(IndividualDetails::default()),
        )
        .unwrap();
        observation.remote_id = Some(99);
        observations.create(&observation).await.unwrap();

        engine.apply(&payload(99, Some("nest"))).await.unwrap();

        let warnings = observations.list_warnings(&observation.id).await.unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].text, WARNING_NEST_AT_INATURALIST);

        let kept = observations.get(&observation.id).await.unwrap().unwrap();
        assert_eq!(kept.kind(), ObservationKind::Individual);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remote_individual_with_nest_evidence_is_rematerialized() {
        let harness = TestHarness::new().await;
        harness.seed_taxon().await;
        let engine = harness.engine();

        let created = engine
            .reconcile_from_remote(&payload(99, None))
            .await
            .unwrap();
        assert_eq!(created.kind(), ObservationKind::Individual);

        let nest = engine.apply(&payload(99, Some("nest"))).await.unwrap();
        assert_eq!(nest.kind(), ObservationKind::Nest);
        assert_eq!(nest.remote_id, Some(99));
        assert_ne!(nest.id, created.id);

        let observations = LibSqlObservationRepository::new(harness.db.connection());
        assert!(observations.get(&created.id).await.unwrap().is_none());
        assert_eq!(observations.list(None, 10, 0).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_rematerialization_keeps_the_original_record() {
        let harness = TestHarness::new().await;
        harness.seed_taxon().await;
        let engine = harness.engine();

        let created = engine
            .reconcile_from_remote(&payload(99, None))
            .await
            .unwrap();

        // Nest evidence, but the payload's taxon is now unknown: the create
        // path fails and the original individual must survive
        let mut broken = payload(99, Some("nest"));
        broken.taxon = RemoteTaxon {
            id: 54_327,
            name: "Vespa crabro".to_string(),
        };

        let error = engine.apply(&broken).await.unwrap_err();
        assert!(matches!(error, Error::TaxonMatch(_)));

        let observations = LibSqlObservationRepository::new(harness.db.connection());
        let kept = observations.get(&created.id).await.unwrap().unwrap();
        assert_eq!(kept.kind(), ObservationKind::Individual);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_of_pushed_local_record_queues_exactly_one_ledger_entry() {
        let harness = TestHarness::new().await;
        let taxon = harness.seed_taxon().await;
        *harness.client.create_result.lock().unwrap() = Some(42);
        let engine = harness.engine();

        let observations = LibSqlObservationRepository::new(harness.db.connection());
        let mut observation = Observation::new(
            Origin::Local,
            Some(taxon.id),
            Utc.with_ymd_and_hms(2021, 6, 1, 10, 0, 0).unwrap(),
            50.8,
            4.4,
            ObservationDetails::Nest(NestDetails::default()),
        )
        .unwrap();
        observations.create(&observation).await.unwrap();
        engine
            .push_to_remote(&mut observation, &credentials())
            .await
            .unwrap();

        engine.delete_observation(&observation).await.unwrap();

        let ledger = LibSqlDeletionLedgerRepository::new(harness.db.connection());
        let entries = ledger.list().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].remote_id, 42);
        assert!(observations.get(&observation.id).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_of_remote_origin_record_queues_nothing() {
        let harness = TestHarness::new().await;
        harness.seed_taxon().await;
        let engine = harness.engine();

        let created = engine
            .reconcile_from_remote(&payload(99, None))
            .await
            .unwrap();
        engine.delete_observation(&created).await.unwrap();

        let ledger = LibSqlDeletionLedgerRepository::new(harness.db.connection());
        assert!(ledger.list().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_ledger_entry_removed_only_after_successful_remote_delete() {
        let harness = TestHarness::new().await;
        let engine = harness.engine();
        let ledger = LibSqlDeletionLedgerRepository::new(harness.db.connection());

        ledger.enqueue(42).await.unwrap();

        *harness.client.fail_deletes.lock().unwrap() = true;
        let deleted = engine.process_deletion_ledger(&credentials()).await.unwrap();
        assert_eq!(deleted, 0);
        assert_eq!(ledger.list().await.unwrap().len(), 1);

        *harness.client.fail_deletes.lock().unwrap() = false;
        let deleted = engine.process_deletion_ledger(&credentials()).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(ledger.list().await.unwrap().is_empty());
        assert_eq!(harness.client.deleted.lock().unwrap().as_slice(), &[42]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_membership_check_flags_project_and_taxon_anomalies() {
        let harness = TestHarness::new().await;
        harness.seed_taxon().await;
        let engine = harness.engine();

        let created = engine.apply(&payload(99, None)).await.unwrap();

        let mut stray = payload(99, None);
        stray.project_ids = vec![1];
        stray.taxon = RemoteTaxon {
            id: 54_327,
            name: "Vespa crabro".to_string(),
        };
        engine.check_membership(&stray).await.unwrap();

        let observations = LibSqlObservationRepository::new(harness.db.connection());
        let warnings: Vec<String> = observations
            .list_warnings(&created.id)
            .await
            .unwrap()
            .into_iter()
            .map(|warning| warning.text)
            .collect();
        assert!(warnings.contains(&WARNING_NOT_IN_PROJECT.to_string()));
        assert!(warnings.contains(&WARNING_UNKNOWN_TAXON.to_string()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_membership_check_without_local_record_is_a_no_op() {
        let harness = TestHarness::new().await;
        harness.seed_taxon().await;
        let engine = harness.engine();

        engine.check_membership(&payload(12345, None)).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_community_confirmation_tri_state() {
        let harness = TestHarness::new().await;
        let engine = harness.engine();

        let mut unknown = payload(1, None);
        unknown.community_taxon_id = None;
        assert_eq!(engine.community_confirmation(&unknown), None);

        let mut confirmed = payload(2, None);
        confirmed.community_taxon_id = Some(119_019);
        assert_eq!(engine.community_confirmation(&confirmed), Some(true));

        let mut denied = payload(3, None);
        denied.community_taxon_id = Some(54_327);
        assert_eq!(engine.community_confirmation(&denied), Some(false));
    }
}
