use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::worker::Location;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Unassigned,
    PendingManual,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestStatus::Completed | RequestStatus::Cancelled | RequestStatus::NoShow
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            RequestStatus::Unassigned => "unassigned",
            RequestStatus::PendingManual => "pending_manual",
            RequestStatus::Assigned => "assigned",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
            RequestStatus::NoShow => "no_show",
        }
    }
}

/// Half-open interval `[start, end)` in the request's local time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    /// Touching endpoints are not an overlap.
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub customer_name: String,
    pub service_type: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_hours: f64,
    pub address: String,
    pub location: Location,
    pub status: RequestStatus,
    pub assigned_worker_id: Option<Uuid>,
    pub assignment_attempts: u32,
    pub assigned_at: Option<DateTime<Utc>>,
    pub assigned_by_operator: bool,
    pub status_changed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ServiceRequest {
    pub fn window(&self) -> TimeWindow {
        let start = self.date.and_time(self.start_time);
        let minutes = self.duration_minutes();
        TimeWindow {
            start,
            end: start + Duration::minutes(minutes),
        }
    }

    fn duration_minutes(&self) -> i64 {
        (self.duration_hours * 60.0).round() as i64
    }

    /// A worker's commitment: assigned to them and not yet in a terminal state.
    pub fn is_active_commitment_of(&self, worker_id: Uuid) -> bool {
        self.assigned_worker_id == Some(worker_id) && !self.status.is_terminal()
    }

    /// Checks the fields the engine cannot work without.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.duration_hours > 0.0) || self.duration_hours > 24.0 {
            return Err(format!(
                "duration must be within (0, 24] hours, got {}",
                self.duration_hours
            ));
        }
        if self.duration_minutes() < 1 {
            return Err(format!(
                "duration must be at least one minute, got {} hours",
                self.duration_hours
            ));
        }
        if self.service_type.trim().is_empty() {
            return Err("service type cannot be empty".to_string());
        }
        if self.location.is_empty() {
            return Err("request needs coordinates or a postal code".to_string());
        }
        let window = self.window();
        if window.end.date() != self.date && window.end.time() != NaiveTime::MIN {
            return Err("requested window must end on the same day".to_string());
        }
        Ok(())
    }
}
