use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::engine::availability::{self, Rejection};
use crate::engine::candidates::find_candidates;
use crate::engine::notify::Notifier;
use crate::engine::scoring;
use crate::error::{AppError, StoreError};
use crate::geo;
use crate::models::assignment::{
    AssignedWorker, AssignmentDecision, AssignmentEvent, AssignmentOutcome, Candidate,
    ForceAssignOutcome, NO_ELIGIBLE_WORKER,
};
use crate::models::request::{RequestStatus, ServiceRequest};
use crate::models::worker::WorkerProfile;
use crate::observability::metrics::Metrics;
use crate::store::{AssignmentStore, AssignmentTx, AssignmentWrite, LockOutcome};

/// Result of trying one candidate inside a transaction.
enum CommitAttempt {
    Committed {
        request: ServiceRequest,
        worker: WorkerProfile,
    },
    Busy,
    Rejected(Rejection),
}

enum Recheck {
    Passed {
        request: ServiceRequest,
        worker: WorkerProfile,
    },
    Failed(Rejection),
}

enum ForcedStage {
    Written {
        request: ServiceRequest,
        worker: WorkerProfile,
        conflicts: Vec<Uuid>,
        previous_worker: Option<Uuid>,
    },
    Blocked {
        conflicts: Vec<Uuid>,
    },
}

#[derive(Clone)]
pub struct AssignmentEngine {
    store: Arc<dyn AssignmentStore>,
    notifier: Notifier,
    config: EngineConfig,
    metrics: Metrics,
    events_tx: broadcast::Sender<AssignmentEvent>,
}

impl AssignmentEngine {
    pub fn new(
        store: Arc<dyn AssignmentStore>,
        notifier: Notifier,
        config: EngineConfig,
        metrics: Metrics,
        events_tx: broadcast::Sender<AssignmentEvent>,
    ) -> Self {
        Self {
            store,
            notifier,
            config,
            metrics,
            events_tx,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// One automatic assignment attempt for an unassigned or pending request.
    /// Callers must not run two attempts for the same request at once.
    pub async fn attempt_assignment(&self, request_id: Uuid) -> Result<AssignmentOutcome, AppError> {
        let request = self.load_request(request_id).await?;

        match request.status {
            RequestStatus::Unassigned | RequestStatus::PendingManual => {}
            RequestStatus::Assigned | RequestStatus::InProgress => {
                return Err(AppError::Conflict(format!(
                    "request {request_id} is already assigned"
                )));
            }
            status => {
                return Err(AppError::Conflict(format!(
                    "request {request_id} is {}",
                    status.label()
                )));
            }
        }

        self.run_attempt(request).await
    }

    /// Same as [`attempt_assignment`](Self::attempt_assignment), restricted to
    /// requests waiting for manual handling.
    pub async fn retry_assignment(&self, request_id: Uuid) -> Result<AssignmentOutcome, AppError> {
        let request = self.load_request(request_id).await?;

        if request.status != RequestStatus::PendingManual {
            return Err(AppError::Conflict(format!(
                "request {request_id} is {}, only pending_manual requests can be retried",
                request.status.label()
            )));
        }

        self.run_attempt(request).await
    }

    /// Operator override. Scoring is skipped; the overlap check still runs and
    /// only a non-empty `reason` lets a conflicting assignment through.
    /// An assigned request may be moved to a different worker, who replaces
    /// the previous one; the previous worker is told the job was withdrawn.
    pub async fn force_assign(
        &self,
        request_id: Uuid,
        worker_id: Uuid,
        reason: Option<String>,
    ) -> Result<ForceAssignOutcome, AppError> {
        let request = self.load_request(request_id).await?;
        if request.status.is_terminal() || request.status == RequestStatus::InProgress {
            return Err(AppError::Conflict(format!(
                "request {request_id} is {}",
                request.status.label()
            )));
        }

        if request.assigned_worker_id == Some(worker_id) {
            return Err(AppError::Conflict(format!(
                "request {request_id} is already assigned to worker {worker_id}"
            )));
        }
        if self.store.worker(worker_id).await?.is_none() {
            return Err(AppError::NotFound(format!("worker {worker_id} not found")));
        }

        let reason = reason
            .map(|reason| reason.trim().to_string())
            .filter(|reason| !reason.is_empty());

        let mut tx = self.store.begin().await?;
        match tx.lock_worker(worker_id).await {
            LockOutcome::Locked => {}
            LockOutcome::Busy => {
                tx.rollback().await;
                self.metrics.lock_busy_total.inc();
                return Err(AppError::Conflict(format!(
                    "worker {worker_id} is being assigned elsewhere, retry shortly"
                )));
            }
            LockOutcome::Error(StoreError::NotFound(_)) => {
                tx.rollback().await;
                return Err(AppError::NotFound(format!("worker {worker_id} not found")));
            }
            LockOutcome::Error(err) => {
                tx.rollback().await;
                return Err(err.into());
            }
        }

        let staged =
            match stage_forced(tx.as_mut(), request_id, worker_id, reason.is_some()).await {
                Ok(staged) => staged,
                Err(err) => {
                    tx.rollback().await;
                    return Err(err);
                }
            };

        match staged {
            ForcedStage::Blocked { conflicts } => {
                tx.rollback().await;
                info!(
                    request_id = %request_id,
                    worker_id = %worker_id,
                    conflicts = conflicts.len(),
                    "manual assignment refused: overlapping commitments and no override reason"
                );
                Ok(ForceAssignOutcome {
                    request_id,
                    worker_id,
                    success: false,
                    had_conflicts: true,
                    conflicting_requests: conflicts,
                })
            }
            ForcedStage::Written {
                request,
                worker,
                conflicts,
                previous_worker,
            } => {
                tx.commit().await?;

                if let Some(previous) = previous_worker {
                    info!(
                        request_id = %request_id,
                        previous_worker_id = %previous,
                        worker_id = %worker_id,
                        "operator moved request to another worker"
                    );
                    self.notifier.assignment_withdrawn(&request, previous);
                }

                let had_conflicts = !conflicts.is_empty();
                if had_conflicts {
                    self.metrics.forced_assignments_total.inc();
                    warn!(
                        request_id = %request_id,
                        worker_id = %worker_id,
                        reason = reason.as_deref().unwrap_or_default(),
                        conflicting = ?conflicts,
                        "operator forced an overlapping assignment"
                    );
                } else {
                    info!(
                        request_id = %request_id,
                        worker_id = %worker_id,
                        reason = reason.as_deref().unwrap_or_default(),
                        "request assigned by operator"
                    );
                }

                self.announce(&request, &worker, None, true);

                Ok(ForceAssignOutcome {
                    request_id,
                    worker_id,
                    success: true,
                    had_conflicts,
                    conflicting_requests: conflicts,
                })
            }
        }
    }

    /// Ranks candidates without locking or writing anything.
    pub async fn preview(&self, request_id: Uuid) -> Result<Vec<AssignmentDecision>, AppError> {
        let request = self.load_request(request_id).await?;
        let now = Utc::now();
        let candidates = find_candidates(self.store.as_ref(), &request, &self.config, now).await?;
        Ok(self.shortlist(&request, candidates, now))
    }

    async fn load_request(&self, request_id: Uuid) -> Result<ServiceRequest, AppError> {
        let request = self
            .store
            .request(request_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("request {request_id} not found")))?;

        request.validate().map_err(AppError::BadRequest)?;
        Ok(request)
    }

    async fn run_attempt(&self, request: ServiceRequest) -> Result<AssignmentOutcome, AppError> {
        let start = Instant::now();

        let result = match self.store.record_attempt(request.id).await {
            Ok(request) => self.assign_best(&request).await,
            Err(err) => Err(err.into()),
        };

        let outcome = match &result {
            Ok(outcome) if outcome.success => "assigned",
            Ok(_) => "pending_manual",
            Err(_) => "error",
        };
        self.metrics
            .observe_attempt(outcome, start.elapsed().as_secs_f64());

        if let Err(err) = &result {
            error!(request_id = %request.id, error = %err, "assignment attempt aborted");
        }

        result
    }

    async fn assign_best(&self, request: &ServiceRequest) -> Result<AssignmentOutcome, AppError> {
        let now = Utc::now();
        let candidates = find_candidates(self.store.as_ref(), request, &self.config, now).await?;
        let found = candidates.len();
        let ranked = self.shortlist(request, candidates, now);

        if ranked.is_empty() {
            info!(
                request_id = %request.id,
                found,
                "no candidate passed the availability pre-filter"
            );
            return self.escalate(request).await;
        }

        for decision in &ranked {
            let worker_id = decision.candidate.worker.id;

            match self.try_commit(request.id, worker_id, now).await? {
                CommitAttempt::Committed {
                    request: committed,
                    worker,
                } => {
                    info!(
                        request_id = %committed.id,
                        worker_id = %worker.id,
                        score = decision.score,
                        attempts = committed.assignment_attempts,
                        "request assigned"
                    );
                    self.announce(&committed, &worker, Some(decision.score), false);

                    return Ok(AssignmentOutcome {
                        request_id: committed.id,
                        success: true,
                        status: committed.status,
                        attempts: committed.assignment_attempts,
                        worker: Some(AssignedWorker {
                            id: worker.id,
                            name: worker.name,
                            rating: worker.rating,
                        }),
                        score: Some(decision.score),
                        score_breakdown: Some(decision.breakdown.clone()),
                        reason: None,
                    });
                }
                CommitAttempt::Busy => {
                    self.metrics.lock_busy_total.inc();
                    debug!(
                        request_id = %request.id,
                        worker_id = %worker_id,
                        "worker locked by another assignment, trying next candidate"
                    );
                }
                CommitAttempt::Rejected(rejection) => {
                    self.metrics.recheck_rejections_total.inc();
                    debug!(
                        request_id = %request.id,
                        worker_id = %worker_id,
                        reason = %rejection,
                        "re-check under lock failed, trying next candidate"
                    );
                }
            }
        }

        info!(
            request_id = %request.id,
            ranked = ranked.len(),
            "every ranked candidate was taken or failed the re-check"
        );
        self.escalate(request).await
    }

    fn shortlist(
        &self,
        request: &ServiceRequest,
        candidates: Vec<Candidate>,
        now: DateTime<Utc>,
    ) -> Vec<AssignmentDecision> {
        let decisions = candidates
            .into_iter()
            .filter_map(|candidate| {
                let estimate = geo::estimate(&request.location, &candidate.worker.location);
                match availability::validate(
                    &candidate.worker,
                    request,
                    estimate.as_ref(),
                    &candidate.commitments,
                ) {
                    Ok(()) => Some(scoring::decide(
                        candidate,
                        estimate,
                        request,
                        &self.config.scoring,
                        now,
                    )),
                    Err(rejection) => {
                        debug!(
                            request_id = %request.id,
                            worker_id = %candidate.worker.id,
                            reason = %rejection,
                            "candidate filtered out"
                        );
                        None
                    }
                }
            })
            .collect();

        scoring::rank(decisions)
    }

    async fn try_commit(
        &self,
        request_id: Uuid,
        worker_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<CommitAttempt, StoreError> {
        let mut tx = self.store.begin().await?;

        match tx.lock_worker(worker_id).await {
            LockOutcome::Locked => {}
            LockOutcome::Busy => {
                tx.rollback().await;
                return Ok(CommitAttempt::Busy);
            }
            LockOutcome::Error(StoreError::NotFound(_)) => {
                tx.rollback().await;
                return Ok(CommitAttempt::Rejected(Rejection::Ineligible));
            }
            LockOutcome::Error(err) => {
                tx.rollback().await;
                return Err(err);
            }
        }

        match recheck_and_stage(tx.as_mut(), request_id, worker_id, now).await {
            Ok(Recheck::Passed { request, worker }) => {
                tx.commit().await?;
                Ok(CommitAttempt::Committed { request, worker })
            }
            Ok(Recheck::Failed(rejection)) => {
                tx.rollback().await;
                Ok(CommitAttempt::Rejected(rejection))
            }
            Err(err) => {
                tx.rollback().await;
                Err(err)
            }
        }
    }

    async fn escalate(&self, request: &ServiceRequest) -> Result<AssignmentOutcome, AppError> {
        let pending = self.store.mark_pending_manual(request.id).await?;

        warn!(
            request_id = %pending.id,
            attempts = pending.assignment_attempts,
            "no eligible worker, request needs manual assignment"
        );

        match self.store.active_operators().await {
            Ok(operators) => self.notifier.manual_assignment_required(&pending, &operators),
            Err(err) => {
                self.metrics.notification_failures_total.inc();
                warn!(
                    request_id = %pending.id,
                    error = %err,
                    "could not load operators for the manual assignment alert"
                );
            }
        }

        Ok(AssignmentOutcome {
            request_id: pending.id,
            success: false,
            status: pending.status,
            attempts: pending.assignment_attempts,
            worker: None,
            score: None,
            score_breakdown: None,
            reason: Some(NO_ELIGIBLE_WORKER.to_string()),
        })
    }

    fn announce(
        &self,
        request: &ServiceRequest,
        worker: &WorkerProfile,
        score: Option<f64>,
        forced: bool,
    ) {
        self.notifier.assignment_committed(request, worker);

        let _ = self.events_tx.send(AssignmentEvent {
            request_id: request.id,
            worker_id: worker.id,
            score,
            forced,
            assigned_at: request.assigned_at.unwrap_or_else(Utc::now),
        });
    }
}

/// The authoritative check. Runs with the worker lock held and reads only
/// through the transaction.
async fn recheck_and_stage<T>(
    tx: &mut T,
    request_id: Uuid,
    worker_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Recheck, StoreError>
where
    T: AssignmentTx + ?Sized,
{
    let Some(worker) = tx.worker(worker_id).await? else {
        return Ok(Recheck::Failed(Rejection::Ineligible));
    };
    let request = tx
        .request(request_id)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("request {request_id}")))?;

    if !matches!(
        request.status,
        RequestStatus::Unassigned | RequestStatus::PendingManual
    ) {
        return Err(StoreError::Constraint(format!(
            "request {request_id} changed to {} during assignment",
            request.status.label()
        )));
    }

    let commitments = tx.active_commitments(worker_id).await?;
    let estimate = geo::estimate(&request.location, &worker.location);
    if let Err(rejection) =
        availability::validate(&worker, &request, estimate.as_ref(), &commitments)
    {
        return Ok(Recheck::Failed(rejection));
    }

    let request = tx
        .assign(AssignmentWrite {
            request_id,
            worker_id,
            assigned_at: now,
            by_operator: false,
        })
        .await?;

    Ok(Recheck::Passed { request, worker })
}

async fn stage_forced<T>(
    tx: &mut T,
    request_id: Uuid,
    worker_id: Uuid,
    override_allowed: bool,
) -> Result<ForcedStage, AppError>
where
    T: AssignmentTx + ?Sized,
{
    let worker = tx
        .worker(worker_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("worker {worker_id} not found")))?;
    let request = tx
        .request(request_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("request {request_id} not found")))?;

    if request.assigned_worker_id == Some(worker_id) {
        return Err(AppError::Conflict(format!(
            "request {request_id} is already assigned to worker {worker_id}"
        )));
    }
    let previous_worker = match request.status {
        RequestStatus::Assigned => request.assigned_worker_id,
        _ => None,
    };

    let commitments = tx.active_commitments(worker_id).await?;
    let conflicts = availability::find_conflicts(&request, &commitments);

    if !conflicts.is_empty() && !override_allowed {
        return Ok(ForcedStage::Blocked { conflicts });
    }

    let request = tx
        .assign(AssignmentWrite {
            request_id,
            worker_id,
            assigned_at: Utc::now(),
            by_operator: true,
        })
        .await?;

    Ok(ForcedStage::Written {
        request,
        worker,
        conflicts,
        previous_worker,
    })
}
