use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::error::StoreError;
use crate::geo::within_bounding_box;
use crate::models::operator::Operator;
use crate::models::request::{RequestStatus, ServiceRequest};
use crate::models::worker::{WorkerProfile, WorkerStats};
use crate::store::{AssignmentStore, AssignmentTx, AssignmentWrite, CandidateQuery, LockOutcome};

/// In-process store backed by concurrent maps. Worker row locks are
/// per-worker mutexes that are only ever taken with `try_lock`.
#[derive(Default)]
pub struct MemoryStore {
    workers: DashMap<Uuid, WorkerProfile>,
    requests: DashMap<Uuid, ServiceRequest>,
    operators: DashMap<Uuid, Operator>,
    worker_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_worker(&self, worker: WorkerProfile) {
        self.workers.insert(worker.id, worker);
    }

    pub fn list_workers(&self) -> Vec<WorkerProfile> {
        self.workers
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn set_worker_availability(
        &self,
        id: Uuid,
        is_available: bool,
    ) -> Result<WorkerProfile, StoreError> {
        let mut worker = self
            .workers
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("worker {id}")))?;

        let now = Utc::now();
        worker.is_available = is_available;
        worker.last_active_at = Some(now);
        worker.updated_at = now;

        Ok(worker.clone())
    }

    pub fn insert_operator(&self, operator: Operator) {
        self.operators.insert(operator.id, operator);
    }

    pub fn list_operators(&self) -> Vec<Operator> {
        self.operators
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn insert_request(&self, request: ServiceRequest) {
        self.requests.insert(request.id, request);
    }

    pub fn get_request(&self, id: Uuid) -> Option<ServiceRequest> {
        self.requests.get(&id).map(|entry| entry.value().clone())
    }

    pub fn list_requests(&self) -> Vec<ServiceRequest> {
        self.requests
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Lifecycle moves after assignment: work starting, finishing, or falling through.
    pub fn transition_request(
        &self,
        id: Uuid,
        status: RequestStatus,
    ) -> Result<ServiceRequest, StoreError> {
        let mut request = self
            .requests
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("request {id}")))?;

        let allowed = match (request.status, status) {
            (from, _) if from.is_terminal() => false,
            (RequestStatus::Assigned, RequestStatus::InProgress) => true,
            (RequestStatus::Assigned | RequestStatus::InProgress, RequestStatus::Completed) => {
                true
            }
            (RequestStatus::Assigned, RequestStatus::NoShow) => true,
            (_, RequestStatus::Cancelled) => true,
            _ => false,
        };
        if !allowed {
            return Err(StoreError::Constraint(format!(
                "request {id} cannot move from {} to {}",
                request.status.label(),
                status.label()
            )));
        }

        let now = Utc::now();
        request.status = status;
        request.status_changed_at = now;

        if status == RequestStatus::Completed {
            if let Some(worker_id) = request.assigned_worker_id {
                if let Some(mut worker) = self.workers.get_mut(&worker_id) {
                    worker.total_completed_jobs = worker.total_completed_jobs.saturating_add(1);
                    worker.updated_at = now;
                }
            }
        }

        Ok(request.clone())
    }

    /// Lock entries exist only for known workers.
    fn lock_handle(&self, worker_id: Uuid) -> Option<Arc<Mutex<()>>> {
        if !self.workers.contains_key(&worker_id) {
            return None;
        }
        Some(self.worker_locks.entry(worker_id).or_default().clone())
    }

    fn commitments_of(&self, worker_id: Uuid) -> Vec<ServiceRequest> {
        self.requests
            .iter()
            .filter(|entry| entry.value().is_active_commitment_of(worker_id))
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn update_request<F>(&self, id: Uuid, apply: F) -> Result<ServiceRequest, StoreError>
    where
        F: FnOnce(&mut ServiceRequest),
    {
        let mut request = self
            .requests
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("request {id}")))?;
        apply(&mut request);
        Ok(request.clone())
    }
}

fn matches_query(worker: &WorkerProfile, query: &CandidateQuery) -> bool {
    let eligible = worker.background_approved && worker.is_available && worker.is_active;
    let fresh = worker
        .last_active_at
        .map(|seen| seen >= query.active_since)
        .unwrap_or(true);
    let offers = query
        .service_type
        .as_deref()
        .map(|service| worker.offers(service))
        .unwrap_or(true);
    let in_box = match (&query.near, &worker.location.point) {
        (Some(center), Some(point)) => {
            within_bounding_box(center, point, worker.service_radius_km)
        }
        _ => true,
    };

    eligible && fresh && offers && in_box
}

#[async_trait]
impl AssignmentStore for MemoryStore {
    async fn request(&self, id: Uuid) -> Result<Option<ServiceRequest>, StoreError> {
        Ok(self.get_request(id))
    }

    async fn worker(&self, id: Uuid) -> Result<Option<WorkerProfile>, StoreError> {
        Ok(self.workers.get(&id).map(|entry| entry.value().clone()))
    }

    async fn eligible_workers(
        &self,
        query: &CandidateQuery,
    ) -> Result<Vec<WorkerProfile>, StoreError> {
        Ok(self
            .workers
            .iter()
            .filter(|entry| matches_query(entry.value(), query))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn active_commitments(
        &self,
        worker_id: Uuid,
    ) -> Result<Vec<ServiceRequest>, StoreError> {
        Ok(self.commitments_of(worker_id))
    }

    async fn worker_stats(
        &self,
        worker_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<WorkerStats, StoreError> {
        let mut stats = WorkerStats::default();

        for entry in self.requests.iter() {
            let request = entry.value();
            if request.assigned_worker_id != Some(worker_id) {
                continue;
            }

            if !request.status.is_terminal() {
                stats.active_commitments += 1;
            } else if request.status_changed_at >= since {
                match request.status {
                    RequestStatus::Completed => stats.completed_recent += 1,
                    RequestStatus::NoShow => stats.failed_recent += 1,
                    _ => {}
                }
            }

            stats.last_commitment_at = stats.last_commitment_at.max(request.assigned_at);
        }

        Ok(stats)
    }

    async fn active_operators(&self) -> Result<Vec<Operator>, StoreError> {
        Ok(self
            .operators
            .iter()
            .filter(|entry| entry.value().active)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn record_attempt(&self, request_id: Uuid) -> Result<ServiceRequest, StoreError> {
        self.update_request(request_id, |request| {
            request.assignment_attempts = request.assignment_attempts.saturating_add(1);
        })
    }

    async fn mark_pending_manual(&self, request_id: Uuid) -> Result<ServiceRequest, StoreError> {
        self.update_request(request_id, |request| {
            request.status = RequestStatus::PendingManual;
            request.status_changed_at = Utc::now();
        })
    }

    async fn begin<'a>(&'a self) -> Result<Box<dyn AssignmentTx + 'a>, StoreError> {
        Ok(Box::new(MemoryTx {
            store: self,
            guards: HashMap::new(),
            staged: Vec::new(),
        }))
    }
}

pub struct MemoryTx<'a> {
    store: &'a MemoryStore,
    guards: HashMap<Uuid, OwnedMutexGuard<()>>,
    staged: Vec<ServiceRequest>,
}

impl MemoryTx<'_> {
    fn staged_request(&self, id: Uuid) -> Option<&ServiceRequest> {
        self.staged.iter().find(|request| request.id == id)
    }
}

#[async_trait]
impl<'a> AssignmentTx for MemoryTx<'a> {
    async fn lock_worker(&mut self, worker_id: Uuid) -> LockOutcome {
        if self.guards.contains_key(&worker_id) {
            return LockOutcome::Locked;
        }

        let Some(handle) = self.store.lock_handle(worker_id) else {
            return LockOutcome::Error(StoreError::NotFound(format!("worker {worker_id}")));
        };

        match handle.try_lock_owned() {
            Ok(guard) => {
                self.guards.insert(worker_id, guard);
                LockOutcome::Locked
            }
            Err(_) => LockOutcome::Busy,
        }
    }

    async fn worker(&self, id: Uuid) -> Result<Option<WorkerProfile>, StoreError> {
        self.store.worker(id).await
    }

    async fn request(&self, id: Uuid) -> Result<Option<ServiceRequest>, StoreError> {
        if let Some(staged) = self.staged_request(id) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.store.get_request(id))
    }

    async fn active_commitments(
        &self,
        worker_id: Uuid,
    ) -> Result<Vec<ServiceRequest>, StoreError> {
        let mut commitments: Vec<ServiceRequest> = self
            .store
            .commitments_of(worker_id)
            .into_iter()
            .filter(|request| self.staged_request(request.id).is_none())
            .collect();

        commitments.extend(
            self.staged
                .iter()
                .filter(|request| request.is_active_commitment_of(worker_id))
                .cloned(),
        );

        Ok(commitments)
    }

    async fn assign(&mut self, write: AssignmentWrite) -> Result<ServiceRequest, StoreError> {
        if !self.guards.contains_key(&write.worker_id) {
            return Err(StoreError::Constraint(format!(
                "worker {} is not locked by this transaction",
                write.worker_id
            )));
        }

        let mut request = match self.staged_request(write.request_id) {
            Some(staged) => staged.clone(),
            None => self
                .store
                .get_request(write.request_id)
                .ok_or_else(|| StoreError::NotFound(format!("request {}", write.request_id)))?,
        };

        request.assigned_worker_id = Some(write.worker_id);
        request.status = RequestStatus::Assigned;
        request.assigned_at = Some(write.assigned_at);
        request.assigned_by_operator = write.by_operator;
        request.status_changed_at = write.assigned_at;

        self.staged.retain(|staged| staged.id != request.id);
        self.staged.push(request.clone());

        Ok(request)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx {
            store,
            guards,
            staged,
        } = *self;

        for request in staged {
            store.requests.insert(request.id, request);
        }
        drop(guards);

        Ok(())
    }

    async fn rollback(self: Box<Self>) {}
}
