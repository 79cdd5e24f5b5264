//! Durable-store contract used by the assignment engine.
//!
//! Reads outside a transaction are snapshots and may be stale. Anything the
//! commit decision depends on is re-read through an [`AssignmentTx`] after
//! the worker lock is held.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::operator::Operator;
use crate::models::request::ServiceRequest;
use crate::models::worker::{GeoPoint, WorkerProfile, WorkerStats};

pub use memory::MemoryStore;

/// Outcome of a non-blocking row lock.
#[derive(Debug)]
pub enum LockOutcome {
    Locked,
    Busy,
    Error(StoreError),
}

/// Filter for the candidate query. Workers must be background approved,
/// available and active regardless of what is set here.
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub service_type: Option<String>,
    /// Workers last seen before this instant are stale. Never-seen workers pass.
    pub active_since: DateTime<Utc>,
    /// When set, workers with coordinates must fall inside a box of their own
    /// service radius around this point.
    pub near: Option<GeoPoint>,
}

#[derive(Debug, Clone)]
pub struct AssignmentWrite {
    pub request_id: Uuid,
    pub worker_id: Uuid,
    pub assigned_at: DateTime<Utc>,
    pub by_operator: bool,
}

#[async_trait]
pub trait AssignmentStore: Send + Sync {
    async fn request(&self, id: Uuid) -> Result<Option<ServiceRequest>, StoreError>;

    async fn worker(&self, id: Uuid) -> Result<Option<WorkerProfile>, StoreError>;

    async fn eligible_workers(
        &self,
        query: &CandidateQuery,
    ) -> Result<Vec<WorkerProfile>, StoreError>;

    async fn active_commitments(&self, worker_id: Uuid)
        -> Result<Vec<ServiceRequest>, StoreError>;

    /// Workload and history for one worker; `since` bounds the completion counts.
    async fn worker_stats(
        &self,
        worker_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<WorkerStats, StoreError>;

    async fn active_operators(&self) -> Result<Vec<Operator>, StoreError>;

    /// Increments `assignment_attempts` and returns the updated request.
    async fn record_attempt(&self, request_id: Uuid) -> Result<ServiceRequest, StoreError>;

    async fn mark_pending_manual(&self, request_id: Uuid) -> Result<ServiceRequest, StoreError>;

    async fn begin<'a>(&'a self) -> Result<Box<dyn AssignmentTx + 'a>, StoreError>;
}

/// A short transaction around lock, re-check and commit. Dropping it without
/// `commit` discards staged writes and releases every lock it holds.
#[async_trait]
pub trait AssignmentTx: Send + Sync {
    /// Never waits: a lock held elsewhere yields [`LockOutcome::Busy`].
    async fn lock_worker(&mut self, worker_id: Uuid) -> LockOutcome;

    async fn worker(&self, id: Uuid) -> Result<Option<WorkerProfile>, StoreError>;

    async fn request(&self, id: Uuid) -> Result<Option<ServiceRequest>, StoreError>;

    async fn active_commitments(&self, worker_id: Uuid)
        -> Result<Vec<ServiceRequest>, StoreError>;

    /// Stages the assignment. The worker must be locked by this transaction.
    async fn assign(&mut self, write: AssignmentWrite) -> Result<ServiceRequest, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>);
}
