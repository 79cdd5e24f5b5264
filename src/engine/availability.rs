//! Decides whether one worker can take one request's time window.
//!
//! The same predicate runs twice per attempt: once over the unlocked
//! snapshot to build the ranking, and once more under the worker lock right
//! before the write. Only the second run may authorize a commit.

use chrono::Datelike;
use thiserror::Error;
use uuid::Uuid;

use crate::geo::ProximityEstimate;
use crate::models::request::{ServiceRequest, TimeWindow};
use crate::models::worker::{WeeklySchedule, WorkerProfile};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("worker is not available, active and approved")]
    Ineligible,

    #[error("distance {distance_km:.1} km exceeds service radius {radius_km:.1} km")]
    OutOfRange { distance_km: f64, radius_km: f64 },

    #[error("requested window is outside the worker's schedule")]
    OutsideSchedule,

    #[error("overlaps existing commitment {request_id}")]
    Conflict { request_id: Uuid },
}

pub fn validate(
    worker: &WorkerProfile,
    request: &ServiceRequest,
    estimate: Option<&ProximityEstimate>,
    commitments: &[ServiceRequest],
) -> Result<(), Rejection> {
    check_eligibility(worker)?;
    check_range(worker, estimate)?;

    let window = request.window();
    check_schedule(&worker.weekly_schedule, &window)?;

    match find_conflicts(request, commitments).first() {
        Some(&request_id) => Err(Rejection::Conflict { request_id }),
        None => Ok(()),
    }
}

pub fn check_eligibility(worker: &WorkerProfile) -> Result<(), Rejection> {
    if worker.is_available && worker.is_active && worker.background_approved {
        Ok(())
    } else {
        Err(Rejection::Ineligible)
    }
}

/// An unknown distance never disqualifies.
pub fn check_range(
    worker: &WorkerProfile,
    estimate: Option<&ProximityEstimate>,
) -> Result<(), Rejection> {
    match estimate {
        Some(estimate) if estimate.distance_km > worker.service_radius_km => {
            Err(Rejection::OutOfRange {
                distance_km: estimate.distance_km,
                radius_km: worker.service_radius_km,
            })
        }
        _ => Ok(()),
    }
}

pub fn check_schedule(schedule: &WeeklySchedule, window: &TimeWindow) -> Result<(), Rejection> {
    let date = window.start.date();

    match schedule.day(date.weekday()).hours_on(date) {
        Some((opens, closes)) if window.start >= opens && window.end <= closes => Ok(()),
        _ => Err(Rejection::OutsideSchedule),
    }
}

/// Active commitments whose window intersects the request's, excluding the request itself.
pub fn find_conflicts(request: &ServiceRequest, commitments: &[ServiceRequest]) -> Vec<Uuid> {
    let window = request.window();

    commitments
        .iter()
        .filter(|commitment| commitment.id != request.id && !commitment.status.is_terminal())
        .filter(|commitment| commitment.window().overlaps(&window))
        .map(|commitment| commitment.id)
        .collect()
}
