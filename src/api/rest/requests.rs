use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::{NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, StoreError};
use crate::geo::ProximityTier;
use crate::models::assignment::{AssignmentOutcome, ForceAssignOutcome, ScoreBreakdown};
use crate::models::request::{RequestStatus, ServiceRequest};
use crate::models::worker::Location;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/requests", post(create_request).get(list_requests))
        .route("/requests/:id", get(get_request))
        .route("/requests/:id/candidates", get(preview_candidates))
        .route("/requests/:id/assign", post(attempt_assignment))
        .route("/requests/:id/retry", post(retry_assignment))
        .route("/requests/:id/force-assign", post(force_assign))
        .route("/requests/:id/status", patch(update_status))
}

#[derive(Deserialize)]
pub struct CreateServiceRequest {
    pub customer_id: Uuid,
    pub customer_name: String,
    pub service_type: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_hours: f64,
    #[serde(default)]
    pub address: String,
    pub location: Location,
}

#[derive(Deserialize)]
pub struct ForceAssignRequest {
    pub worker_id: Uuid,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: RequestStatus,
}

#[derive(Serialize)]
pub struct CandidateView {
    pub worker_id: Uuid,
    pub name: String,
    pub score: f64,
    pub score_breakdown: ScoreBreakdown,
    pub distance_km: Option<f64>,
    pub tier: Option<ProximityTier>,
}

async fn create_request(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateServiceRequest>,
) -> Result<Json<ServiceRequest>, AppError> {
    if payload.customer_name.trim().is_empty() {
        return Err(AppError::BadRequest(
            "customer_name cannot be empty".to_string(),
        ));
    }

    let now = Utc::now();
    let request = ServiceRequest {
        id: Uuid::new_v4(),
        customer_id: payload.customer_id,
        customer_name: payload.customer_name,
        service_type: payload.service_type,
        date: payload.date,
        start_time: payload.start_time,
        duration_hours: payload.duration_hours,
        address: payload.address,
        location: payload.location,
        status: RequestStatus::Unassigned,
        assigned_worker_id: None,
        assignment_attempts: 0,
        assigned_at: None,
        assigned_by_operator: false,
        status_changed_at: now,
        created_at: now,
    };

    request.validate().map_err(AppError::BadRequest)?;

    state.store.insert_request(request.clone());
    Ok(Json(request))
}

async fn list_requests(State(state): State<Arc<AppState>>) -> Json<Vec<ServiceRequest>> {
    Json(state.store.list_requests())
}

async fn get_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ServiceRequest>, AppError> {
    let request = state
        .store
        .get_request(id)
        .ok_or_else(|| AppError::NotFound(format!("request {id} not found")))?;

    Ok(Json(request))
}

async fn preview_candidates(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<CandidateView>>, AppError> {
    let ranked = state.engine.preview(id).await?;

    Ok(Json(
        ranked
            .into_iter()
            .map(|decision| CandidateView {
                worker_id: decision.candidate.worker.id,
                name: decision.candidate.worker.name,
                score: decision.score,
                score_breakdown: decision.breakdown,
                distance_km: decision.estimate.map(|e| e.distance_km),
                tier: decision.estimate.map(|e| e.tier),
            })
            .collect(),
    ))
}

async fn attempt_assignment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<AssignmentOutcome>, AppError> {
    Ok(Json(state.engine.attempt_assignment(id).await?))
}

async fn retry_assignment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<AssignmentOutcome>, AppError> {
    Ok(Json(state.engine.retry_assignment(id).await?))
}

async fn force_assign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ForceAssignRequest>,
) -> Result<Json<ForceAssignOutcome>, AppError> {
    Ok(Json(
        state
            .engine
            .force_assign(id, payload.worker_id, payload.reason)
            .await?,
    ))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<ServiceRequest>, AppError> {
    let request = state
        .store
        .transition_request(id, payload.status)
        .map_err(|err| match err {
            StoreError::NotFound(_) => AppError::NotFound(format!("request {id} not found")),
            StoreError::Constraint(msg) => AppError::Conflict(msg),
            other => AppError::Store(other),
        })?;

    Ok(Json(request))
}
