use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// A place as the store knows it: live coordinates, a postal code, or both.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Location {
    #[serde(default)]
    pub point: Option<GeoPoint>,
    #[serde(default)]
    pub postal_code: Option<String>,
}

impl Location {
    pub fn is_empty(&self) -> bool {
        self.point.is_none()
            && self
                .postal_code
                .as_deref()
                .map(|code| code.trim().is_empty())
                .unwrap_or(true)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DaySchedule {
    #[default]
    Closed,
    Open { start: NaiveTime, end: NaiveTime },
}

impl DaySchedule {
    /// Opening hours on `date`. A closing time of 00:00 means open until midnight.
    pub fn hours_on(self, date: NaiveDate) -> Option<(NaiveDateTime, NaiveDateTime)> {
        match self {
            DaySchedule::Open { start, end } if end == NaiveTime::MIN => {
                let closes = date.succ_opt()?.and_time(NaiveTime::MIN);
                Some((date.and_time(start), closes))
            }
            DaySchedule::Open { start, end } if start < end => {
                Some((date.and_time(start), date.and_time(end)))
            }
            _ => None,
        }
    }
}

/// Seven day entries, Monday first.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WeeklySchedule {
    pub days: [DaySchedule; 7],
}

impl WeeklySchedule {
    pub fn every_day(start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            days: [DaySchedule::Open { start, end }; 7],
        }
    }

    pub fn day(&self, weekday: Weekday) -> DaySchedule {
        self.days[weekday.num_days_from_monday() as usize]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerProfile {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub location: Location,
    pub service_radius_km: f64,
    pub weekly_schedule: WeeklySchedule,
    /// Postal-code prefixes the worker explicitly declared they cover.
    pub coverage_zones: Vec<String>,
    /// Service types offered. Empty means every type.
    pub services: Vec<String>,
    pub rating: f64,
    pub total_completed_jobs: u32,
    pub experience_years: f64,
    pub hourly_rate: f64,
    pub is_available: bool,
    pub is_active: bool,
    pub background_approved: bool,
    pub last_active_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl WorkerProfile {
    pub fn offers(&self, service_type: &str) -> bool {
        self.services.is_empty()
            || self
                .services
                .iter()
                .any(|offered| offered.eq_ignore_ascii_case(service_type))
    }

    pub fn covers_zone(&self, postal_code: Option<&str>) -> bool {
        let Some(code) = postal_code.map(crate::geo::normalize_postal_code) else {
            return false;
        };
        if code.is_empty() {
            return false;
        }

        self.coverage_zones
            .iter()
            .map(|zone| crate::geo::normalize_postal_code(zone))
            .any(|zone| !zone.is_empty() && code.starts_with(&zone))
    }
}

/// Derived workload and history figures attached to a candidate.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkerStats {
    pub active_commitments: u32,
    pub completed_recent: u32,
    pub failed_recent: u32,
    pub last_commitment_at: Option<DateTime<Utc>>,
}

impl WorkerStats {
    pub fn completion_rate(&self) -> Option<f64> {
        let finished = self.completed_recent + self.failed_recent;
        if finished == 0 {
            return None;
        }
        Some(self.completed_recent as f64 / finished as f64)
    }
}
