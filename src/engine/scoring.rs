use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::{ProximityEstimate, ProximityTier};
use crate::models::assignment::{AssignmentDecision, Candidate, ScoreBreakdown};
use crate::models::request::ServiceRequest;

/// Sub-score used when the input it depends on is unknown.
const NEUTRAL: f64 = 0.5;

/// Maximum points each term can contribute.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoringWeights {
    pub zone_proximity: f64,
    pub workload: f64,
    pub rating: f64,
    pub experience: f64,
    pub distance: f64,
    pub recency: f64,
    pub completion_rate: f64,
    pub coverage_bonus: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            zone_proximity: 300.0,
            workload: 200.0,
            rating: 150.0,
            experience: 100.0,
            distance: 100.0,
            recency: 50.0,
            completion_rate: 50.0,
            coverage_bonus: 50.0,
        }
    }
}

impl ScoringWeights {
    pub fn max_total(&self) -> f64 {
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

/// Saturation points for the linear terms.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoringLimits {
    pub workload_ceiling: u32,
    pub experience_cap_years: f64,
    pub max_useful_distance_km: f64,
    pub recency_cap_days: f64,
}

impl Default for ScoringLimits {
    fn default() -> Self {
        Self {
            workload_ceiling: 5,
            experience_cap_years: 10.0,
            max_useful_distance_km: 25.0,
            recency_cap_days: 30.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ScoringConfig {
    pub weights: ScoringWeights,
    pub limits: ScoringLimits,
}

pub fn compute_score(
    candidate: &Candidate,
    estimate: Option<&ProximityEstimate>,
    request: &ServiceRequest,
    config: &ScoringConfig,
    now: DateTime<Utc>,
) -> (f64, ScoreBreakdown) {
    let weights = &config.weights;
    let limits = &config.limits;
    let worker = &candidate.worker;
    let stats = &candidate.stats;

    let breakdown = ScoreBreakdown {
        zone_proximity: weights.zone_proximity * tier_score(estimate.map(|e| e.tier)),
        workload: weights.workload * workload_score(stats.active_commitments, limits.workload_ceiling),
        rating: weights.rating * rating_score(worker.rating),
        experience: weights.experience
            * capped_ratio(worker.experience_years, limits.experience_cap_years),
        distance: weights.distance
            * distance_score(estimate.map(|e| e.distance_km), limits.max_useful_distance_km),
        recency: weights.recency
            * recency_score(stats.last_commitment_at, now, limits.recency_cap_days),
        completion_rate: weights.completion_rate
            * stats.completion_rate().map(|rate| rate.clamp(0.0, 1.0)).unwrap_or(NEUTRAL),
        coverage_bonus: if worker.covers_zone(request.location.postal_code.as_deref()) {
            weights.coverage_bonus
        } else {
            0.0
        },
    };

    (breakdown.total(), breakdown)
}

pub fn decide(
    candidate: Candidate,
    estimate: Option<ProximityEstimate>,
    request: &ServiceRequest,
    config: &ScoringConfig,
    now: DateTime<Utc>,
) -> AssignmentDecision {
    let (score, breakdown) = compute_score(&candidate, estimate.as_ref(), request, config, now);
    AssignmentDecision {
        candidate,
        estimate,
        score,
        breakdown,
    }
}

/// Highest score first; ties go to the longer-idle worker, then the lowest id.
pub fn rank(mut decisions: Vec<AssignmentDecision>) -> Vec<AssignmentDecision> {
    decisions.sort_by(compare_decisions);
    decisions
}

fn compare_decisions(a: &AssignmentDecision, b: &AssignmentDecision) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| {
            a.candidate
                .worker
                .last_active_at
                .cmp(&b.candidate.worker.last_active_at)
        })
        .then_with(|| a.candidate.worker.id.cmp(&b.candidate.worker.id))
}

fn tier_score(tier: Option<ProximityTier>) -> f64 {
    match tier {
        Some(ProximityTier::SamePoint) => 1.0,
        Some(ProximityTier::SameLocalArea) => 0.75,
        Some(ProximityTier::SameRegion) => 0.4,
        Some(ProximityTier::Distant) => 0.1,
        None => NEUTRAL,
    }
}

fn workload_score(active_commitments: u32, ceiling: u32) -> f64 {
    if ceiling == 0 {
        return if active_commitments == 0 { 1.0 } else { 0.0 };
    }

    let load = active_commitments.min(ceiling) as f64 / ceiling as f64;
    1.0 - load
}

fn rating_score(rating: f64) -> f64 {
    (rating / 5.0).clamp(0.0, 1.0)
}

fn capped_ratio(value: f64, cap: f64) -> f64 {
    if cap <= 0.0 {
        return 0.0;
    }
    (value / cap).clamp(0.0, 1.0)
}

fn distance_score(distance_km: Option<f64>, max_useful_km: f64) -> f64 {
    match distance_km {
        Some(distance) => 1.0 - capped_ratio(distance, max_useful_km),
        None => NEUTRAL,
    }
}

fn recency_score(last: Option<DateTime<Utc>>, now: DateTime<Utc>, cap_days: f64) -> f64 {
    match last {
        Some(at) => {
            let idle_days = (now - at).num_seconds().max(0) as f64 / 86_400.0;
            capped_ratio(idle_days, cap_days)
        }
        None => NEUTRAL,
    }
}
