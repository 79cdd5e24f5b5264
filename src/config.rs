use std::env;

use chrono::{DateTime, Duration, Utc};

use crate::engine::scoring::{ScoringConfig, ScoringLimits, ScoringWeights};
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub event_buffer_size: usize,
    pub engine: EngineConfig,
}

/// Knobs of the assignment engine itself.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Workers not seen for longer than this are not considered.
    pub staleness_days: i64,
    /// Window for the completion-rate history.
    pub lookback_days: i64,
    pub scoring: ScoringConfig,
}

/// Upper bound for the staleness and lookback windows.
pub const MAX_WINDOW_DAYS: i64 = 3650;

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            staleness_days: 30,
            lookback_days: 90,
            scoring: ScoringConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") | Err(_) => LogFormat::Compact,
            Ok(other) => {
                return Err(AppError::Internal(format!(
                    "invalid LOG_FORMAT: {other}, expected compact or json"
                )))
            }
        };

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            engine: EngineConfig::from_env()?,
        })
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = EngineConfig::default();
        let weights = defaults.scoring.weights;
        let limits = defaults.scoring.limits;

        let config = Self {
            staleness_days: parse_or_default("WORKER_STALENESS_DAYS", defaults.staleness_days)?,
            lookback_days: parse_or_default("STATS_LOOKBACK_DAYS", defaults.lookback_days)?,
            scoring: ScoringConfig {
                weights: ScoringWeights {
                    zone_proximity: parse_or_default(
                        "WEIGHT_ZONE_PROXIMITY",
                        weights.zone_proximity,
                    )?,
                    workload: parse_or_default("WEIGHT_WORKLOAD", weights.workload)?,
                    rating: parse_or_default("WEIGHT_RATING", weights.rating)?,
                    experience: parse_or_default("WEIGHT_EXPERIENCE", weights.experience)?,
                    distance: parse_or_default("WEIGHT_DISTANCE", weights.distance)?,
                    recency: parse_or_default("WEIGHT_RECENCY", weights.recency)?,
                    completion_rate: parse_or_default(
                        "WEIGHT_COMPLETION_RATE",
                        weights.completion_rate,
                    )?,
                    coverage_bonus: parse_or_default(
                        "WEIGHT_COVERAGE_BONUS",
                        weights.coverage_bonus,
                    )?,
                },
                limits: ScoringLimits {
                    workload_ceiling: parse_or_default(
                        "WORKLOAD_CEILING",
                        limits.workload_ceiling,
                    )?,
                    max_useful_distance_km: parse_or_default(
                        "MAX_USEFUL_DISTANCE_KM",
                        limits.max_useful_distance_km,
                    )?,
                    ..limits
                },
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Workers last seen before this instant are stale.
    pub fn active_since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        days_before(now, self.staleness_days)
    }

    /// Start of the completion-rate history window.
    pub fn history_since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        days_before(now, self.lookback_days)
    }

    fn validate(&self) -> Result<(), AppError> {
        let windows = [
            ("WORKER_STALENESS_DAYS", self.staleness_days),
            ("STATS_LOOKBACK_DAYS", self.lookback_days),
        ];
        for (key, days) in windows {
            if !(1..=MAX_WINDOW_DAYS).contains(&days) {
                return Err(AppError::Internal(format!(
                    "{key} must be within 1..={MAX_WINDOW_DAYS}, got {days}"
                )));
            }
        }

        let limits = &self.scoring.limits;
        let caps = [
            ("MAX_USEFUL_DISTANCE_KM", limits.max_useful_distance_km),
            ("experience cap", limits.experience_cap_years),
            ("recency cap", limits.recency_cap_days),
        ];
        for (key, cap) in caps {
            if !cap.is_finite() || cap <= 0.0 {
                return Err(AppError::Internal(format!(
                    "{key} must be finite and > 0, got {cap}"
                )));
            }
        }

        let w = &self.scoring.weights;
        let all = [
            w.zone_proximity,
            w.workload,
            w.rating,
            w.experience,
            w.distance,
            w.recency,
            w.completion_rate,
            w.coverage_bonus,
        ];
        if all.iter().any(|weight| !weight.is_finite() || *weight < 0.0) {
            return Err(AppError::Internal(
                "scoring weights must be finite and non-negative".to_string(),
            ));
        }

        Ok(())
    }
}

/// Saturates at the earliest representable instant instead of overflowing.
fn days_before(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    Duration::try_days(days)
        .and_then(|span| now.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
