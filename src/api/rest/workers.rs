use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::worker::{Location, WeeklySchedule, WorkerProfile};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/workers", post(create_worker).get(list_workers))
        .route("/workers/:id/availability", patch(update_availability))
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
pub struct CreateWorkerRequest {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub location: Location,
    pub service_radius_km: f64,
    pub weekly_schedule: WeeklySchedule,
    #[serde(default)]
    pub coverage_zones: Vec<String>,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub total_completed_jobs: u32,
    #[serde(default)]
    pub experience_years: f64,
    #[serde(default)]
    pub hourly_rate: f64,
    #[serde(default = "default_true")]
    pub background_approved: bool,
}

#[derive(Deserialize)]
pub struct UpdateAvailabilityRequest {
    pub is_available: bool,
}

async fn create_worker(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateWorkerRequest>,
) -> Result<Json<WorkerProfile>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    if !(payload.service_radius_km > 0.0) {
        return Err(AppError::BadRequest(
            "service_radius_km must be > 0".to_string(),
        ));
    }

    if payload.location.is_empty() {
        return Err(AppError::BadRequest(
            "location needs coordinates or a postal code".to_string(),
        ));
    }

    let now = Utc::now();
    let worker = WorkerProfile {
        id: Uuid::new_v4(),
        name: payload.name,
        phone: payload.phone,
        location: payload.location,
        service_radius_km: payload.service_radius_km,
        weekly_schedule: payload.weekly_schedule,
        coverage_zones: payload.coverage_zones,
        services: payload.services,
        rating: payload.rating.clamp(0.0, 5.0),
        total_completed_jobs: payload.total_completed_jobs,
        experience_years: payload.experience_years.max(0.0),
        hourly_rate: payload.hourly_rate.max(0.0),
        is_available: true,
        is_active: true,
        background_approved: payload.background_approved,
        last_active_at: Some(now),
        updated_at: now,
    };

    state.store.insert_worker(worker.clone());
    Ok(Json(worker))
}

async fn list_workers(State(state): State<Arc<AppState>>) -> Json<Vec<WorkerProfile>> {
    Json(state.store.list_workers())
}

async fn update_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAvailabilityRequest>,
) -> Result<Json<WorkerProfile>, AppError> {
    let worker = state
        .store
        .set_worker_availability(id, payload.is_available)
        .map_err(|_| AppError::NotFound(format!("worker {id} not found")))?;

    Ok(Json(worker))
}
