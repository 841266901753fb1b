//! # API REST
//!
//! REST API implementation for Sickbay.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, status code mapping)
//!
//! Workflow rules live in `sickbay-core`; handlers only translate between HTTP and the desks.

#![warn(rust_2018_idioms)]

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::{delete, get, post},
    Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use sickbay_core::aggregation::{
    CampaignSummary, ClassSummary, IncidentQuery, IncidentSortKey, IncidentTally, Rollup,
    SortDirection,
};
use sickbay_core::desk::IncidentIntake;
use sickbay_core::export;
use sickbay_core::model::{
    BatchStatus, CampaignEvent, Channel, ClassProgress, Incident, IncidentStatus, NewCampaignEvent,
    NotificationBatch, Participation, Priority, RecipientResponse, ResponseStatus, Staff, Student,
    StudentResponse,
};
use sickbay_core::responses::{ChannelEffectiveness, ResponseTally};
use sickbay_core::status::{EmergencyAction, ProcessAction, RecordResponse, RecordResult};
use sickbay_core::{
    CampaignDesk, IncidentDesk, NotificationDesk, RemoteStore, StoreError, WorkflowError,
};

/// Application state for the REST API server.
///
/// Cloned per request; the desks behind the `Arc`s are shared.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn RemoteStore>,
    incidents: Arc<IncidentDesk>,
    campaigns: Arc<CampaignDesk>,
    notifications: Arc<NotificationDesk>,
}

impl AppState {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            incidents: Arc::new(IncidentDesk::new(store.clone())),
            campaigns: Arc::new(CampaignDesk::new(store.clone())),
            notifications: Arc::new(NotificationDesk::new(store.clone())),
            store,
        }
    }

    pub fn incidents(&self) -> &IncidentDesk {
        &self.incidents
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub error: String,
    /// Whether the same request may succeed if retried later.
    pub retryable: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RefreshRes {
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RecordResultReq {
    pub class_name: String,
    pub student_id: String,
    pub outcome: Participation,
    pub result_date: NaiveDate,
    #[serde(default)]
    pub reaction: String,
    #[serde(default)]
    pub follow_up_plan: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ScheduleReq {
    pub checkup_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct StudentFilter {
    pub grade: Option<String>,
}

type ApiError = (StatusCode, Json<ErrorRes>);

/// Maps a workflow error onto a status code and logs it.
///
/// Store failures are 503 and logged as errors; caller mistakes are logged as warnings.
fn reject(context: &str, err: WorkflowError) -> ApiError {
    let status = match &err {
        WorkflowError::InvalidTransition { .. } => StatusCode::CONFLICT,
        WorkflowError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        WorkflowError::NotFound { .. } | WorkflowError::Remote(StoreError::NotFound { .. }) => {
            StatusCode::NOT_FOUND
        }
        WorkflowError::Remote(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    if status == StatusCode::SERVICE_UNAVAILABLE {
        tracing::error!("{} error: {}", context, err);
    } else {
        tracing::warn!("{} rejected: {}", context, err);
    }
    (
        status,
        Json(ErrorRes {
            retryable: err.is_retryable(),
            error: err.to_string(),
        }),
    )
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        list_incidents,
        create_incident,
        refresh_incidents,
        incident_tally,
        export_incidents,
        process_incident,
        escalate_incident,
        list_campaigns,
        create_campaign,
        delete_campaign,
        campaign_rollup,
        record_campaign_result,
        list_notifications,
        schedule_notification,
        send_notification,
        record_notification_response,
        notification_tally,
        channel_report,
        list_students,
        list_staff,
    ),
    components(schemas(
        HealthRes,
        ErrorRes,
        RefreshRes,
        RecordResultReq,
        ScheduleReq,
        Incident,
        IncidentIntake,
        IncidentStatus,
        Priority,
        IncidentTally,
        IncidentSortKey,
        SortDirection,
        ProcessAction,
        EmergencyAction,
        CampaignEvent,
        CampaignSummary,
        ClassSummary,
        ClassProgress,
        StudentResponse,
        Participation,
        NewCampaignEvent,
        Rollup,
        NotificationBatch,
        BatchStatus,
        Channel,
        RecipientResponse,
        ResponseStatus,
        RecordResponse,
        ResponseTally,
        ChannelEffectiveness,
        Student,
        Staff,
    ))
)]
pub struct ApiDoc;

/// Builds the application router with OpenAPI docs and permissive CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/incidents", get(list_incidents).post(create_incident))
        .route("/incidents/refresh", post(refresh_incidents))
        .route("/incidents/tally", get(incident_tally))
        .route("/incidents/export", get(export_incidents))
        .route("/incidents/:id/process", post(process_incident))
        .route("/incidents/:id/emergency", post(escalate_incident))
        .route("/campaigns", get(list_campaigns).post(create_campaign))
        .route("/campaigns/:id", delete(delete_campaign))
        .route("/campaigns/:id/rollup", get(campaign_rollup))
        .route("/campaigns/:id/results", post(record_campaign_result))
        .route("/notifications", get(list_notifications))
        .route("/notifications/channels", get(channel_report))
        .route("/notifications/:id/schedule", post(schedule_notification))
        .route("/notifications/:id/send", post(send_notification))
        .route(
            "/notifications/:id/responses",
            post(record_notification_response),
        )
        .route("/notifications/:id/tally", get(notification_tally))
        .route("/students", get(list_students))
        .route("/staff", get(list_staff))
        .merge(
            SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for monitoring and load balancers.
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "Sickbay REST API is alive".into(),
    })
}

// ============================================================================
// Incidents
// ============================================================================

#[utoipa::path(
    get,
    path = "/incidents",
    params(
        ("search" = Option<String>, Query, description = "Case-insensitive text search"),
        ("status" = Option<IncidentStatus>, Query, description = "Exact status filter"),
        ("priority" = Option<Priority>, Query, description = "Exact priority filter"),
        ("sort" = Option<IncidentSortKey>, Query, description = "Sort key"),
        ("direction" = Option<SortDirection>, Query, description = "asc or desc")
    ),
    responses(
        (status = 200, description = "Filtered incident list", body = [Incident]),
        (status = 400, description = "Bad query")
    )
)]
/// Lists incidents from the desk's current snapshot.
#[axum::debug_handler]
async fn list_incidents(
    State(state): State<AppState>,
    Query(query): Query<IncidentQuery>,
) -> Json<Vec<Incident>> {
    Json(state.incidents.list(&query))
}

#[utoipa::path(
    post,
    path = "/incidents",
    request_body = IncidentIntake,
    responses(
        (status = 201, description = "Incident recorded", body = Incident),
        (status = 503, description = "Store unavailable", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn create_incident(
    State(state): State<AppState>,
    Json(req): Json<IncidentIntake>,
) -> Result<(StatusCode, Json<Incident>), ApiError> {
    match state.incidents.intake(req) {
        Ok(incident) => Ok((StatusCode::CREATED, Json(incident))),
        Err(e) => Err(reject("Create incident", e)),
    }
}

#[utoipa::path(
    post,
    path = "/incidents/refresh",
    responses(
        (status = 200, description = "Collection reloaded", body = RefreshRes),
        (status = 503, description = "Store unavailable", body = ErrorRes)
    )
)]
/// Reloads the incident collection from the store, replacing the snapshot whole.
#[axum::debug_handler]
async fn refresh_incidents(State(state): State<AppState>) -> Result<Json<RefreshRes>, ApiError> {
    state
        .incidents
        .refresh()
        .map(|count| Json(RefreshRes { count }))
        .map_err(|e| reject("Refresh incidents", e))
}

#[utoipa::path(
    get,
    path = "/incidents/tally",
    responses(
        (status = 200, description = "Dashboard counts", body = IncidentTally)
    )
)]
#[axum::debug_handler]
async fn incident_tally(State(state): State<AppState>) -> Json<IncidentTally> {
    Json(state.incidents.tally())
}

#[utoipa::path(
    get,
    path = "/incidents/export",
    params(
        ("search" = Option<String>, Query, description = "Case-insensitive text search"),
        ("status" = Option<IncidentStatus>, Query, description = "Exact status filter"),
        ("priority" = Option<Priority>, Query, description = "Exact priority filter")
    ),
    responses(
        (status = 200, description = "CSV download", body = String, content_type = "text/csv")
    )
)]
/// Downloads the filtered incident list as CSV.
#[axum::debug_handler]
async fn export_incidents(
    State(state): State<AppState>,
    Query(query): Query<IncidentQuery>,
) -> impl IntoResponse {
    let rows = state.incidents.list(&query);
    let filename = export::export_filename(Utc::now().date_naive());
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        export::incidents_csv(&rows),
    )
}

#[utoipa::path(
    post,
    path = "/incidents/{id}/process",
    request_body = ProcessAction,
    params(("id" = String, Path, description = "Incident id")),
    responses(
        (status = 200, description = "Incident updated", body = Incident),
        (status = 404, description = "Unknown incident", body = ErrorRes),
        (status = 409, description = "Not permitted from the current status", body = ErrorRes),
        (status = 503, description = "Store unavailable", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn process_incident(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<ProcessAction>,
) -> Result<Json<Incident>, ApiError> {
    state
        .incidents
        .process(&id, req)
        .map(Json)
        .map_err(|e| reject("Process incident", e))
}

#[utoipa::path(
    post,
    path = "/incidents/{id}/emergency",
    request_body = EmergencyAction,
    params(("id" = String, Path, description = "Incident id")),
    responses(
        (status = 200, description = "Incident escalated", body = Incident),
        (status = 404, description = "Unknown incident", body = ErrorRes),
        (status = 409, description = "Not permitted from the current status", body = ErrorRes),
        (status = 503, description = "Store unavailable", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn escalate_incident(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<EmergencyAction>,
) -> Result<Json<Incident>, ApiError> {
    state
        .incidents
        .escalate(&id, req)
        .map(Json)
        .map_err(|e| reject("Escalate incident", e))
}

// ============================================================================
// Campaigns
// ============================================================================

#[utoipa::path(
    get,
    path = "/campaigns",
    responses(
        (status = 200, description = "Campaigns with rollups", body = [CampaignSummary]),
        (status = 503, description = "Store unavailable", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn list_campaigns(
    State(state): State<AppState>,
) -> Result<Json<Vec<CampaignSummary>>, ApiError> {
    state
        .campaigns
        .summaries()
        .map(Json)
        .map_err(|e| reject("List campaigns", e))
}

#[utoipa::path(
    post,
    path = "/campaigns",
    request_body = NewCampaignEvent,
    responses(
        (status = 201, description = "Campaign created", body = CampaignEvent),
        (status = 400, description = "Invalid campaign", body = ErrorRes),
        (status = 503, description = "Store unavailable", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn create_campaign(
    State(state): State<AppState>,
    Json(req): Json<NewCampaignEvent>,
) -> Result<(StatusCode, Json<CampaignEvent>), ApiError> {
    match state.campaigns.create(req) {
        Ok(event) => Ok((StatusCode::CREATED, Json(event))),
        Err(e) => Err(reject("Create campaign", e)),
    }
}

#[utoipa::path(
    delete,
    path = "/campaigns/{id}",
    params(("id" = String, Path, description = "Campaign id")),
    responses(
        (status = 204, description = "Campaign deleted"),
        (status = 404, description = "Unknown campaign", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn delete_campaign(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<StatusCode, ApiError> {
    state
        .campaigns
        .delete(&id)
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(|e| reject("Delete campaign", e))
}

#[utoipa::path(
    get,
    path = "/campaigns/{id}/rollup",
    params(("id" = String, Path, description = "Campaign id")),
    responses(
        (status = 200, description = "Participation counts", body = Rollup),
        (status = 404, description = "Unknown campaign", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn campaign_rollup(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<Rollup>, ApiError> {
    state
        .campaigns
        .rollup(&id)
        .map(Json)
        .map_err(|e| reject("Campaign rollup", e))
}

#[utoipa::path(
    post,
    path = "/campaigns/{id}/results",
    request_body = RecordResultReq,
    params(("id" = String, Path, description = "Campaign id")),
    responses(
        (status = 200, description = "Result recorded", body = CampaignEvent),
        (status = 404, description = "Unknown campaign, class or student", body = ErrorRes),
        (status = 409, description = "Outcome already recorded", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn record_campaign_result(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<RecordResultReq>,
) -> Result<Json<CampaignEvent>, ApiError> {
    let result = RecordResult {
        outcome: req.outcome,
        result_date: req.result_date,
        reaction: req.reaction,
        follow_up_plan: req.follow_up_plan,
    };
    state
        .campaigns
        .record_result(&id, &req.class_name, &req.student_id, result)
        .map(Json)
        .map_err(|e| reject("Record campaign result", e))
}

// ============================================================================
// Notifications
// ============================================================================

#[utoipa::path(
    get,
    path = "/notifications",
    responses(
        (status = 200, description = "Notification batches", body = [NotificationBatch]),
        (status = 503, description = "Store unavailable", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn list_notifications(
    State(state): State<AppState>,
) -> Result<Json<Vec<NotificationBatch>>, ApiError> {
    state
        .notifications
        .list()
        .map(Json)
        .map_err(|e| reject("List notifications", e))
}

#[utoipa::path(
    post,
    path = "/notifications/{id}/schedule",
    request_body = ScheduleReq,
    params(("id" = String, Path, description = "Batch id")),
    responses(
        (status = 200, description = "Batch scheduled", body = NotificationBatch),
        (status = 409, description = "Batch is no longer a draft", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn schedule_notification(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<ScheduleReq>,
) -> Result<Json<NotificationBatch>, ApiError> {
    state
        .notifications
        .schedule(&id, req.checkup_date)
        .map(Json)
        .map_err(|e| reject("Schedule notification", e))
}

#[utoipa::path(
    post,
    path = "/notifications/{id}/send",
    params(("id" = String, Path, description = "Batch id")),
    responses(
        (status = 200, description = "Batch sent", body = NotificationBatch),
        (status = 409, description = "Batch already sent", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn send_notification(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<NotificationBatch>, ApiError> {
    state
        .notifications
        .send(&id, Utc::now())
        .map(Json)
        .map_err(|e| reject("Send notification", e))
}

#[utoipa::path(
    post,
    path = "/notifications/{id}/responses",
    request_body = RecordResponse,
    params(("id" = String, Path, description = "Batch id")),
    responses(
        (status = 200, description = "Response recorded", body = NotificationBatch),
        (status = 409, description = "Batch has not been sent", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn record_notification_response(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<RecordResponse>,
) -> Result<Json<NotificationBatch>, ApiError> {
    state
        .notifications
        .record_response(&id, req, Utc::now())
        .map(Json)
        .map_err(|e| reject("Record notification response", e))
}

#[utoipa::path(
    get,
    path = "/notifications/{id}/tally",
    params(("id" = String, Path, description = "Batch id")),
    responses(
        (status = 200, description = "Response counts", body = ResponseTally),
        (status = 404, description = "Unknown batch", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn notification_tally(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<ResponseTally>, ApiError> {
    state
        .notifications
        .tally(&id)
        .map(Json)
        .map_err(|e| reject("Notification tally", e))
}

#[utoipa::path(
    get,
    path = "/notifications/channels",
    responses(
        (status = 200, description = "Response rate per channel", body = [ChannelEffectiveness])
    )
)]
#[axum::debug_handler]
async fn channel_report(
    State(state): State<AppState>,
) -> Result<Json<Vec<ChannelEffectiveness>>, ApiError> {
    state
        .notifications
        .channel_report()
        .map(Json)
        .map_err(|e| reject("Channel report", e))
}

// ============================================================================
// Lookups
// ============================================================================

#[utoipa::path(
    get,
    path = "/students",
    params(("grade" = Option<String>, Query, description = "Only students in this grade")),
    responses(
        (status = 200, description = "Students", body = [Student])
    )
)]
#[axum::debug_handler]
async fn list_students(
    State(state): State<AppState>,
    Query(filter): Query<StudentFilter>,
) -> Result<Json<Vec<Student>>, ApiError> {
    let students = match filter.grade.as_deref().filter(|g| !g.trim().is_empty()) {
        Some(grade) => state.store.list_students_by_grade(grade),
        None => state.store.list_students(),
    };
    students
        .map(Json)
        .map_err(|e| reject("List students", e.into()))
}

#[utoipa::path(
    get,
    path = "/staff",
    responses(
        (status = 200, description = "Staff", body = [Staff])
    )
)]
#[axum::debug_handler]
async fn list_staff(State(state): State<AppState>) -> Result<Json<Vec<Staff>>, ApiError> {
    state
        .store
        .list_staff()
        .map(Json)
        .map_err(|e| reject("List staff", e.into()))
}
