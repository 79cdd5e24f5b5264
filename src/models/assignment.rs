use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::ProximityEstimate;
use crate::models::request::{RequestStatus, ServiceRequest};
use crate::models::worker::{WorkerProfile, WorkerStats};

pub const NO_ELIGIBLE_WORKER: &str = "no eligible worker";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScoreBreakdown {
    pub zone_proximity: f64,
    pub workload: f64,
    pub rating: f64,
    pub experience: f64,
    pub distance: f64,
    pub recency: f64,
    pub completion_rate: f64,
    pub coverage_bonus: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.zone_proximity
            + self.workload
            + self.rating
            + self.experience
            + self.distance
            + self.recency
            + self.completion_rate
            + self.coverage_bonus
    }
}

/// A worker that survived the repository query, with its derived stats and
/// the commitments seen when the snapshot was taken.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub worker: WorkerProfile,
    pub stats: WorkerStats,
    pub commitments: Vec<ServiceRequest>,
}

/// One ranked option for a request. Never persisted on its own.
#[derive(Debug, Clone)]
pub struct AssignmentDecision {
    pub candidate: Candidate,
    pub estimate: Option<ProximityEstimate>,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignedWorker {
    pub id: Uuid,
    pub name: String,
    pub rating: f64,
}

/// Result of `attempt_assignment` / `retry_assignment`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentOutcome {
    pub request_id: Uuid,
    pub success: bool,
    pub status: RequestStatus,
    pub attempts: u32,
    pub worker: Option<AssignedWorker>,
    pub score: Option<f64>,
    pub score_breakdown: Option<ScoreBreakdown>,
    pub reason: Option<String>,
}

/// Result of an operator `force_assign`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForceAssignOutcome {
    pub request_id: Uuid,
    pub worker_id: Uuid,
    pub success: bool,
    pub had_conflicts: bool,
    pub conflicting_requests: Vec<Uuid>,
}

/// Broadcast to live listeners whenever an assignment commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentEvent {
    pub request_id: Uuid,
    pub worker_id: Uuid,
    pub score: Option<f64>,
    pub forced: bool,
    pub assigned_at: DateTime<Utc>,
}
