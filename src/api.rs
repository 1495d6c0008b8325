//! HTTP API handlers for SmartCampus.
//!
//! Every reading-creating endpoint (manual entry, IoT ingestion, bulk
//! import) runs anomaly detection inside the same transaction as the insert.
//! A storage failure surfaces as 500 and nothing from that request is kept.

use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use crate::ingestion::{self, ImportFileError, ImportSummary, IngestError, IotIngestRequest};
use crate::model::{
    AcknowledgeRequest, Alert, AlertStatus, AlertsQuery, Building, BuildingRequest,
    BuildingUpdate, NewReading, Reading, ReadingRequest, ReadingsQuery, ResolveRequest,
};
use crate::rules::{RuleDraft, RuleRecord, RuleUpdate, RuleValidationError};
use crate::storage::Storage;

/// Header carrying the IoT shared secret.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub iot_api_key: Option<String>,
}

/// Errors returned by handlers, rendered as `{"detail": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    InvalidRule(#[from] RuleValidationError),

    #[error(transparent)]
    InvalidReading(#[from] IngestError),

    #[error(transparent)]
    InvalidImport(#[from] ImportFileError),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{0}")]
    Unavailable(&'static str),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::InvalidImport(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::InvalidRule(_) | ApiError::InvalidReading(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            ApiError::Internal(e) => {
                warn!(error = %e, "Request failed");
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// A stored reading together with the alerts its evaluation raised.
#[derive(Debug, Serialize)]
pub struct RecordedReading {
    #[serde(flatten)]
    pub reading: Reading,
    pub alerts: Vec<Alert>,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/buildings", get(list_buildings).post(create_building))
        .route(
            "/buildings/:id",
            get(get_building).put(update_building).delete(delete_building),
        )
        .route("/readings", get(list_readings).post(create_reading))
        .route("/readings/:id", get(get_reading).delete(delete_reading))
        .route("/iot/ingest", post(iot_ingest))
        .route("/admin/import-readings", post(import_readings))
        .route("/alerts", get(list_alerts))
        .route("/alerts/rules", get(list_rules).post(create_rule))
        .route("/alerts/rules/:id", put(update_rule).delete(delete_rule))
        .route("/alerts/:id", get(get_alert))
        .route("/alerts/:id/acknowledge", put(acknowledge_alert))
        .route("/alerts/:id/resolve", put(resolve_alert))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

// ============================================================================
// Buildings
// ============================================================================

/// GET /buildings - All buildings, ordered by name.
#[instrument(skip(state))]
pub async fn list_buildings(State(state): State<AppState>) -> ApiResult<Json<Vec<Building>>> {
    Ok(Json(state.storage.list_buildings().await?))
}

/// POST /buildings - Register a building. Codes are unique (409).
#[instrument(skip(state, request), fields(code = %request.code))]
pub async fn create_building(
    State(state): State<AppState>,
    Json(request): Json<BuildingRequest>,
) -> ApiResult<(StatusCode, Json<Building>)> {
    if state.storage.get_building_by_code(&request.code).await?.is_some() {
        return Err(ApiError::Conflict(format!(
            "building code '{}' already exists",
            request.code
        )));
    }

    let building = state.storage.insert_building(&request).await?;
    info!(building_id = building.id, "Building created");
    Ok((StatusCode::CREATED, Json(building)))
}

/// GET /buildings/{id} - A single building.
#[instrument(skip(state))]
pub async fn get_building(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Building>> {
    state
        .storage
        .get_building(id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("Building"))
}

/// PUT /buildings/{id} - Partial update. A code taken by another building is 400.
///
/// Thresholds are read fresh by every evaluation, so a change applies to the
/// next reading.
#[instrument(skip(state, update))]
pub async fn update_building(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<BuildingUpdate>,
) -> ApiResult<Json<Building>> {
    if state.storage.get_building(id).await?.is_none() {
        return Err(ApiError::NotFound("Building"));
    }

    if let Some(code) = update.code.as_deref() {
        if let Some(other) = state.storage.get_building_by_code(code).await? {
            if other.id != id {
                return Err(ApiError::BadRequest(
                    "Building code already exists".to_string(),
                ));
            }
        }
    }

    let building = state
        .storage
        .update_building(id, update)
        .await?
        .ok_or(ApiError::NotFound("Building"))?;

    info!(building_id = id, "Building updated");
    Ok(Json(building))
}

/// DELETE /buildings/{id} - Refused (409) while readings, alerts or rules reference it.
#[instrument(skip(state))]
pub async fn delete_building(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    if state.storage.get_building(id).await?.is_none() {
        return Err(ApiError::NotFound("Building"));
    }

    if state.storage.building_in_use(id).await? {
        return Err(ApiError::Conflict(
            "Building still has readings, alerts or rules".to_string(),
        ));
    }

    state.storage.delete_building(id).await?;
    info!(building_id = id, "Building deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Readings
// ============================================================================

/// POST /readings - Record a reading and run anomaly detection on it.
///
/// Returns `201 Created` with the reading and any alerts raised.
#[instrument(skip(state, request), fields(building_id = request.building_id, utility = %request.utility_type))]
pub async fn create_reading(
    State(state): State<AppState>,
    Json(request): Json<ReadingRequest>,
) -> ApiResult<(StatusCode, Json<RecordedReading>)> {
    let value = ingestion::validate_value(request.value)?;

    if state.storage.get_building(request.building_id).await?.is_none() {
        return Err(ApiError::NotFound("Building"));
    }

    let (reading, alerts) = state
        .storage
        .record_reading(&NewReading {
            building_id: request.building_id,
            utility_type: request.utility_type,
            value,
            reading_date: request.reading_date,
            notes: request.notes,
        })
        .await?;

    info!(
        reading_id = reading.id,
        alert_count = alerts.len(),
        "Reading recorded"
    );
    Ok((StatusCode::CREATED, Json(RecordedReading { reading, alerts })))
}

/// GET /readings - Filter by building, utility and date range; newest first.
#[instrument(skip(state))]
pub async fn list_readings(
    State(state): State<AppState>,
    Query(query): Query<ReadingsQuery>,
) -> ApiResult<Json<Vec<Reading>>> {
    Ok(Json(state.storage.list_readings(&query).await?))
}

/// GET /readings/{id} - A single reading.
#[instrument(skip(state))]
pub async fn get_reading(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Reading>> {
    state
        .storage
        .get_reading(id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("Reading"))
}

/// DELETE /readings/{id} - Alerts raised by the reading are kept.
#[instrument(skip(state))]
pub async fn delete_reading(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    if state.storage.delete_reading(id).await? {
        info!(reading_id = id, "Reading deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Reading"))
    }
}

/// POST /iot/ingest - Reading pushed by a metering device.
///
/// The reading travels in the query string
/// (`device_id`, `building_code`, `utility`, `value`, optional `timestamp`).
/// Requires the `X-API-Key` header to match the configured key, and the
/// target building to have IoT ingestion enabled.
#[instrument(skip(state, headers, request), fields(device_id = %request.device_id))]
pub async fn iot_ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(request): Query<IotIngestRequest>,
) -> ApiResult<(StatusCode, Json<RecordedReading>)> {
    let Some(expected) = state.iot_api_key.as_deref() else {
        return Err(ApiError::Unavailable(
            "IoT ingestion is not configured (missing IoT API key)",
        ));
    };
    let provided = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    if provided != Some(expected) {
        warn!("Rejected IoT ingestion with invalid API key");
        return Err(ApiError::Unauthorized("Invalid or missing API key"));
    }

    let building = state
        .storage
        .get_building_by_code(&request.building_code)
        .await?
        .ok_or(ApiError::NotFound("Building"))?;

    if !building.iot_enabled {
        return Err(ApiError::Unavailable(
            "IoT ingestion is disabled for this building",
        ));
    }

    let new_reading = request.into_new_reading(building.id, Utc::now())?;
    let (reading, alerts) = state.storage.record_reading(&new_reading).await?;

    info!(
        reading_id = reading.id,
        alert_count = alerts.len(),
        "IoT reading recorded"
    );
    Ok((StatusCode::CREATED, Json(RecordedReading { reading, alerts })))
}

/// POST /admin/import-readings - Bulk import from an uploaded CSV file.
///
/// Expects multipart form data with a `file` field. Required columns are
/// `timestamp`, `building`, `utility` and `value`, in any case.
#[instrument(skip_all)]
pub async fn import_readings(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<ImportSummary>)> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Multipart error: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let contents = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read file: {e}")))?;
        upload = Some((file_name, contents));
        break;
    }

    let (file_name, contents) =
        upload.ok_or_else(|| ApiError::BadRequest("No file provided".to_string()))?;
    let rows = ingestion::parse_import_file(&file_name, &contents)?;
    info!(file_name = %file_name, rows = rows.len(), "Import file received");

    let summary = ingestion::import_readings(&state.storage, &rows).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

// ============================================================================
// Alerts
// ============================================================================

/// GET /alerts - Filter by status and building; newest first.
#[instrument(skip(state))]
pub async fn list_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertsQuery>,
) -> ApiResult<Json<Vec<Alert>>> {
    Ok(Json(state.storage.list_alerts(&query).await?))
}

/// GET /alerts/{id} - A single alert.
#[instrument(skip(state))]
pub async fn get_alert(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Alert>> {
    state
        .storage
        .get_alert(id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("Alert"))
}

/// PUT /alerts/{id}/acknowledge - Resolved alerts cannot be acknowledged.
#[instrument(skip(state, request))]
pub async fn acknowledge_alert(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    request: Option<Json<AcknowledgeRequest>>,
) -> ApiResult<Json<Alert>> {
    let alert = state
        .storage
        .get_alert(id)
        .await?
        .ok_or(ApiError::NotFound("Alert"))?;

    if alert.status == AlertStatus::Resolved {
        return Err(ApiError::BadRequest(
            "Cannot acknowledge a resolved alert".to_string(),
        ));
    }

    let request = request.map(|Json(body)| body).unwrap_or_default();
    let alert = state
        .storage
        .acknowledge_alert(id, request.acknowledged_by, Utc::now())
        .await?
        .ok_or(ApiError::NotFound("Alert"))?;

    info!(alert_id = id, "Alert acknowledged");
    Ok(Json(alert))
}

/// PUT /alerts/{id}/resolve - Close an alert, with optional notes.
#[instrument(skip(state, request))]
pub async fn resolve_alert(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    request: Option<Json<ResolveRequest>>,
) -> ApiResult<Json<Alert>> {
    if state.storage.get_alert(id).await?.is_none() {
        return Err(ApiError::NotFound("Alert"));
    }

    let request = request.map(|Json(body)| body).unwrap_or_default();
    let alert = state
        .storage
        .resolve_alert(
            id,
            request.resolved_by,
            request.resolution_notes.as_deref(),
            Utc::now(),
        )
        .await?
        .ok_or(ApiError::NotFound("Alert"))?;

    info!(alert_id = id, "Alert resolved");
    Ok(Json(alert))
}

// ============================================================================
// Alert rules
// ============================================================================

/// Validate a draft, including that any referenced building exists.
async fn check_rule(storage: &Storage, draft: &RuleDraft) -> ApiResult<()> {
    draft.validate()?;

    if let Some(building_id) = draft.building_id {
        if storage.get_building(building_id).await?.is_none() {
            return Err(ApiError::NotFound("Building"));
        }
    }

    Ok(())
}

/// GET /alerts/rules - Every configured rule, newest first.
#[instrument(skip(state))]
pub async fn list_rules(State(state): State<AppState>) -> ApiResult<Json<Vec<RuleRecord>>> {
    Ok(Json(state.storage.list_rules().await?))
}

/// POST /alerts/rules - Add a rule (422 if invalid, 404 for an unknown building).
#[instrument(skip(state, draft), fields(name = %draft.name))]
pub async fn create_rule(
    State(state): State<AppState>,
    Json(draft): Json<RuleDraft>,
) -> ApiResult<(StatusCode, Json<RuleRecord>)> {
    check_rule(&state.storage, &draft).await?;

    let rule = state.storage.insert_rule(&draft, Utc::now()).await?;
    info!(rule_id = rule.id, "Alert rule created");
    Ok((StatusCode::CREATED, Json(rule)))
}

/// PUT /alerts/rules/{id} - Partial update; the merged rule is revalidated.
#[instrument(skip(state, update))]
pub async fn update_rule(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<RuleUpdate>,
) -> ApiResult<Json<RuleRecord>> {
    let existing = state
        .storage
        .get_rule(id)
        .await?
        .ok_or(ApiError::NotFound("Alert rule"))?;

    let draft = update.apply(existing.draft);
    check_rule(&state.storage, &draft).await?;

    let rule = state
        .storage
        .update_rule(id, &draft, Utc::now())
        .await?
        .ok_or(ApiError::NotFound("Alert rule"))?;

    info!(rule_id = id, "Alert rule updated");
    Ok(Json(rule))
}

/// DELETE /alerts/rules/{id} - Remove a rule. Alerts it raised are kept.
#[instrument(skip(state))]
pub async fn delete_rule(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<StatusCode> {
    if state.storage.delete_rule(id).await? {
        info!(rule_id = id, "Alert rule deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Alert rule"))
    }
}
