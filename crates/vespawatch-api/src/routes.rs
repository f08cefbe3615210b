use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use vespawatch_core::db::{
    Database, LibSqlManagementActionRepository, LibSqlObservationRepository,
    LibSqlTaxonRepository, ManagementActionRepository, ObservationRepository, TaxonRepository,
};
use vespawatch_core::export::{
    individual_csv_record, management_action_csv_record, nest_csv_record, observation_list_item,
    render_csv, ObservationListItem,
};
use vespawatch_core::models::{
    ActionOutcome, Aftercare, Behaviour, IndividualDetails, ManagementAction, NestDetails,
    NestHeight, NestSite, NestSize, NestType, Method, Observation, ObservationDetails,
    ObservationId, ObservationKind, Origin, Product, TaxonId,
};
use vespawatch_core::reconcile;

use crate::config::AppConfig;
use crate::error::AppError;

const DEFAULT_LIST_LIMIT: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<Database>,
}

impl AppState {
    pub const fn new(config: Arc<AppConfig>, db: Arc<Database>) -> Self {
        Self { config, db }
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/config", get(site_config))
        .route("/api/nests", get(list_nests))
        .route("/api/nests/{id}", get(get_nest))
        .route("/api/individuals", get(list_individuals))
        .route("/api/individuals/{id}", get(get_individual))
        .route("/api/observations", post(create_observation))
        .route("/api/observations/{id}", delete(delete_observation))
        .route("/api/actions", post(save_action))
        .route("/api/actions/{nest_id}", get(get_action).delete(delete_action))
        .route("/api/action_outcomes", get(action_outcomes))
        .route("/api/action_nest_sites", get(action_nest_sites))
        .route("/api/action_nest_types", get(action_nest_types))
        .route("/api/action_aftercare", get(action_aftercare))
        .route("/api/action_products", get(action_products))
        .route("/api/action_methods", get(action_methods))
        .route("/api/csv_export/nests", get(csv_export_nests))
        .route("/api/csv_export/individuals", get(csv_export_individuals))
        .route(
            "/api/csv_export/management_actions",
            get(csv_export_management_actions),
        )
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
    })
}

/// Configuration surfaced to the frontend.
#[derive(Debug, Serialize)]
struct SiteConfigResponse {
    project_id: i64,
    deployment_timezone: String,
    remote_api_base_url: String,
}

async fn site_config(State(state): State<AppState>) -> Json<SiteConfigResponse> {
    Json(SiteConfigResponse {
        project_id: state.config.sync.project_id,
        deployment_timezone: state.config.sync.deployment_timezone.to_string(),
        remote_api_base_url: state.config.sync.api_base_url.clone(),
    })
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct NestsResponse {
    nests: Vec<ObservationListItem>,
}

#[derive(Debug, Serialize)]
struct IndividualsResponse {
    individuals: Vec<ObservationListItem>,
}

async fn taxon_names(state: &AppState) -> Result<HashMap<TaxonId, String>, AppError> {
    let taxa = LibSqlTaxonRepository::new(state.db.connection())
        .list()
        .await?;
    Ok(taxa.into_iter().map(|taxon| (taxon.id, taxon.name)).collect())
}

async fn list_items(
    state: &AppState,
    kind: ObservationKind,
    limit: usize,
) -> Result<Vec<ObservationListItem>, AppError> {
    let conn = state.db.connection();
    let observations = LibSqlObservationRepository::new(conn);
    let actions = LibSqlManagementActionRepository::new(conn);
    let names = taxon_names(state).await?;

    let mut items = Vec::new();
    for observation in observations.list(Some(kind), limit, 0).await? {
        let pictures = observations.list_pictures(&observation.id).await?;
        let action = match kind {
            ObservationKind::Nest => actions.get(&observation.id).await?,
            ObservationKind::Individual => None,
        };
        let species_name = observation
            .taxon_id
            .and_then(|taxon_id| names.get(&taxon_id))
            .map(String::as_str);
        items.push(observation_list_item(
            &observation,
            species_name,
            &pictures,
            action.as_ref(),
        ));
    }
    Ok(items)
}

async fn list_nests(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<NestsResponse>, AppError> {
    let nests = list_items(
        &state,
        ObservationKind::Nest,
        query.limit.unwrap_or(DEFAULT_LIST_LIMIT),
    )
    .await?;
    Ok(Json(NestsResponse { nests }))
}

async fn list_individuals(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<IndividualsResponse>, AppError> {
    let individuals = list_items(
        &state,
        ObservationKind::Individual,
        query.limit.unwrap_or(DEFAULT_LIST_LIMIT),
    )
    .await?;
    Ok(Json(IndividualsResponse { individuals }))
}

async fn single_item(
    state: &AppState,
    id: &str,
    expected_kind: ObservationKind,
) -> Result<ObservationListItem, AppError> {
    let observation = find_observation(state, id).await?;
    if observation.kind() != expected_kind {
        return Err(AppError::not_found(format!(
            "No {} with id {id}",
            expected_kind.as_code()
        )));
    }

    let conn = state.db.connection();
    let observations = LibSqlObservationRepository::new(conn);
    let pictures = observations.list_pictures(&observation.id).await?;
    let action = match expected_kind {
        ObservationKind::Nest => {
            LibSqlManagementActionRepository::new(conn)
                .get(&observation.id)
                .await?
        }
        ObservationKind::Individual => None,
    };
    let names = taxon_names(state).await?;
    let species_name = observation
        .taxon_id
        .and_then(|taxon_id| names.get(&taxon_id))
        .map(String::as_str);

    Ok(observation_list_item(
        &observation,
        species_name,
        &pictures,
        action.as_ref(),
    ))
}

async fn get_nest(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ObservationListItem>, AppError> {
    Ok(Json(single_item(&state, &id, ObservationKind::Nest).await?))
}

async fn get_individual(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ObservationListItem>, AppError> {
    Ok(Json(
        single_item(&state, &id, ObservationKind::Individual).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct CreateObservationRequest {
    pub kind: String,
    pub taxon_id: Option<String>,
    pub observation_time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub comments: String,
    // Nest fields
    pub size: Option<String>,
    pub height: Option<String>,
    pub municipality: Option<String>,
    // Individual fields
    pub individual_count: Option<i32>,
    pub behaviour: Option<String>,
}

/// Build the variant details from a submission, rejecting unknown codes.
pub fn details_from_request(
    request: &CreateObservationRequest,
) -> Result<ObservationDetails, AppError> {
    let kind = ObservationKind::from_code(&request.kind)?;
    match kind {
        ObservationKind::Nest => Ok(ObservationDetails::Nest(NestDetails {
            size: request
                .size
                .as_deref()
                .map(NestSize::from_code)
                .transpose()?,
            height: request
                .height
                .as_deref()
                .map(NestHeight::from_code)
                .transpose()?,
            expert_confirmed: None,
            municipality: request.municipality.clone(),
        })),
        ObservationKind::Individual => Ok(ObservationDetails::Individual(IndividualDetails {
            count: request.individual_count,
            behaviour: request
                .behaviour
                .as_deref()
                .map(Behaviour::from_code)
                .transpose()?,
        })),
    }
}

#[derive(Debug, Serialize)]
struct CreatedResponse {
    id: String,
}

async fn create_observation(
    State(state): State<AppState>,
    Json(request): Json<CreateObservationRequest>,
) -> Result<(axum::http::StatusCode, Json<CreatedResponse>), AppError> {
    let conn = state.db.connection();

    let taxon_id = match &request.taxon_id {
        Some(raw) => {
            let taxon_id: TaxonId = raw
                .parse()
                .map_err(|_| AppError::bad_request(format!("Invalid taxon id: {raw}")))?;
            let taxa = LibSqlTaxonRepository::new(conn);
            if taxa.get(&taxon_id).await?.is_none() {
                return Err(AppError::bad_request(format!(
                    "Unknown taxon id: {taxon_id}"
                )));
            }
            Some(taxon_id)
        }
        None => None,
    };

    let details = details_from_request(&request)?;
    let mut observation = Observation::new(
        Origin::Local,
        taxon_id,
        request.observation_time,
        request.latitude,
        request.longitude,
        details,
    )?;
    observation.comments = request.comments.clone();

    LibSqlObservationRepository::new(conn)
        .create(&observation)
        .await?;
    tracing::info!(id = %observation.id, kind = %request.kind, "Observation submitted");

    Ok((
        axum::http::StatusCode::CREATED,
        Json(CreatedResponse {
            id: observation.id.as_str(),
        }),
    ))
}

async fn find_observation(state: &AppState, id: &str) -> Result<Observation, AppError> {
    let observation_id: ObservationId = id
        .parse()
        .map_err(|_| AppError::bad_request(format!("Invalid observation id: {id}")))?;
    LibSqlObservationRepository::new(state.db.connection())
        .get(&observation_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("No observation with id {id}")))
}

async fn delete_observation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let observation = find_observation(&state, &id).await?;
    reconcile::delete_observation(state.db.connection(), &observation).await?;
    tracing::info!(id = %observation.id, "Observation deleted");
    Ok(Json(serde_json::json!({ "result": "OK" })))
}

#[derive(Debug, Deserialize)]
pub struct SaveActionRequest {
    pub nest_id: String,
    pub outcome: String,
    pub site: Option<String>,
    pub nest_type: Option<String>,
    pub aftercare: Option<String>,
    pub product: Option<String>,
    pub method: Option<String>,
    pub user: String,
    pub action_time: DateTime<Utc>,
    pub duration_minutes: Option<i64>,
    pub number_of_persons: Option<i32>,
    #[serde(default)]
    pub comments: String,
    #[serde(default)]
    pub problems: Vec<String>,
}

async fn save_action(
    State(state): State<AppState>,
    Json(request): Json<SaveActionRequest>,
) -> Result<(axum::http::StatusCode, Json<serde_json::Value>), AppError> {
    let nest = find_observation(&state, &request.nest_id).await?;
    if nest.kind() != ObservationKind::Nest {
        return Err(AppError::bad_request(
            "Management actions only apply to nests",
        ));
    }

    let mut action = ManagementAction::new(
        nest.id,
        ActionOutcome::from_code(&request.outcome)?,
        request.user.clone(),
        request.action_time,
    )?;
    action.site = request.site.as_deref().map(NestSite::from_code).transpose()?;
    action.nest_type = request
        .nest_type
        .as_deref()
        .map(NestType::from_code)
        .transpose()?;
    action.aftercare = request
        .aftercare
        .as_deref()
        .map(Aftercare::from_code)
        .transpose()?;
    action.product = request
        .product
        .as_deref()
        .map(Product::from_code)
        .transpose()?;
    action.method = request.method.as_deref().map(Method::from_code).transpose()?;
    action.duration_minutes = request.duration_minutes;
    action.number_of_persons = request.number_of_persons;
    action.comments = request.comments.clone();
    action.problems = request.problems.clone();

    LibSqlManagementActionRepository::new(state.db.connection())
        .save(&action)
        .await?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(serde_json::json!({ "result": "OK", "nestId": action.nest_id.as_str() })),
    ))
}

async fn get_action(
    State(state): State<AppState>,
    Path(nest_id): Path<String>,
) -> Result<Json<ManagementAction>, AppError> {
    let nest = find_observation(&state, &nest_id).await?;
    LibSqlManagementActionRepository::new(state.db.connection())
        .get(&nest.id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("No action recorded for nest {nest_id}")))
}

async fn delete_action(
    State(state): State<AppState>,
    Path(nest_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let nest = find_observation(&state, &nest_id).await?;
    LibSqlManagementActionRepository::new(state.db.connection())
        .delete(&nest.id)
        .await?;
    Ok(Json(serde_json::json!({ "result": "OK" })))
}

/// A selectable enumeration entry for the admin forms.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ValueLabel {
    pub value: String,
    pub label: String,
}

fn value_labels<T, I>(entries: I, code: impl Fn(&T) -> &'static str, label: impl Fn(&T) -> &'static str) -> Vec<ValueLabel>
where
    I: IntoIterator<Item = T>,
{
    entries
        .into_iter()
        .map(|entry| ValueLabel {
            value: code(&entry).to_string(),
            label: label(&entry).to_string(),
        })
        .collect()
}

async fn action_outcomes() -> Json<Vec<ValueLabel>> {
    Json(value_labels(
        ActionOutcome::ALL,
        |outcome| outcome.as_code(),
        |outcome| outcome.label(),
    ))
}

async fn action_nest_sites() -> Json<Vec<ValueLabel>> {
    Json(value_labels(
        NestSite::ALL,
        |site| site.as_code(),
        |site| site.label(),
    ))
}

async fn action_nest_types() -> Json<Vec<ValueLabel>> {
    Json(value_labels(
        NestType::ALL,
        |nest_type| nest_type.as_code(),
        |nest_type| nest_type.label(),
    ))
}

async fn action_aftercare() -> Json<Vec<ValueLabel>> {
    Json(value_labels(
        Aftercare::ALL,
        |aftercare| aftercare.as_code(),
        |aftercare| aftercare.label(),
    ))
}

async fn action_products() -> Json<Vec<ValueLabel>> {
    Json(value_labels(
        Product::ALL,
        |product| product.as_code(),
        |product| product.label(),
    ))
}

async fn action_methods() -> Json<Vec<ValueLabel>> {
    Json(value_labels(
        Method::ALL,
        |method| method.as_code(),
        |method| method.label(),
    ))
}

/// Page through every observation of one kind (exports are unbounded).
async fn list_all_observations(
    observations: &LibSqlObservationRepository<'_>,
    kind: ObservationKind,
) -> Result<Vec<Observation>, AppError> {
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

fn csv_response(filename: &str, body: String) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
}

async fn csv_export_nests(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = state.db.connection();
    let observations = LibSqlObservationRepository::new(conn);
    let actions = LibSqlManagementActionRepository::new(conn);
    let names = taxon_names(&state).await?;

    let mut records = Vec::new();
    for observation in list_all_observations(&observations, ObservationKind::Nest).await? {
        let action = actions.get(&observation.id).await?;
        let species_name = observation
            .taxon_id
            .and_then(|taxon_id| names.get(&taxon_id))
            .map(String::as_str);
        records.push(nest_csv_record(&observation, species_name, action.as_ref())?);
    }

    Ok(csv_response("nests.csv", render_csv(&records)?))
}

async fn csv_export_individuals(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = state.db.connection();
    let observations = LibSqlObservationRepository::new(conn);
    let names = taxon_names(&state).await?;

    let mut records = Vec::new();
    for observation in
        list_all_observations(&observations, ObservationKind::Individual).await?
    {
        let species_name = observation
            .taxon_id
            .and_then(|taxon_id| names.get(&taxon_id))
            .map(String::as_str);
        records.push(individual_csv_record(&observation, species_name)?);
    }

    Ok(csv_response("individuals.csv", render_csv(&records)?))
}

async fn csv_export_management_actions(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let actions = LibSqlManagementActionRepository::new(state.db.connection())
        .list()
        .await?;
    let records: Vec<_> = actions.iter().map(management_action_csv_record).collect();

    Ok(csv_response(
        "management_actions.csv",
        render_csv(&records)?,
    ))
}
