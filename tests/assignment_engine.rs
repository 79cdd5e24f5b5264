use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use cleaner_assignment::config::EngineConfig;
use cleaner_assignment::engine::notify::{MemoryOutbox, NotificationSink, Notifier};
use cleaner_assignment::engine::AssignmentEngine;
use cleaner_assignment::error::{AppError, NotifyError, StoreError};
use cleaner_assignment::models::assignment::NO_ELIGIBLE_WORKER;
use cleaner_assignment::models::notification::{Notification, NotificationCategory};
use cleaner_assignment::models::operator::Operator;
use cleaner_assignment::models::request::{RequestStatus, ServiceRequest};
use cleaner_assignment::models::worker::{Location, WeeklySchedule, WorkerProfile, WorkerStats};
use cleaner_assignment::observability::metrics::Metrics;
use cleaner_assignment::store::{
    AssignmentStore, AssignmentTx, CandidateQuery, LockOutcome, MemoryStore,
};
use tokio::sync::broadcast;
use uuid::Uuid;

fn engine(store: Arc<dyn AssignmentStore>) -> (AssignmentEngine, Arc<MemoryOutbox>, Metrics) {
    let outbox = Arc::new(MemoryOutbox::new());
    let (engine, metrics) = engine_with(store, EngineConfig::default(), outbox.clone());
    (engine, outbox, metrics)
}

fn engine_with(
    store: Arc<dyn AssignmentStore>,
    config: EngineConfig,
    sink: Arc<dyn NotificationSink>,
) -> (AssignmentEngine, Metrics) {
    let metrics = Metrics::new();
    let (events_tx, _rx) = broadcast::channel(64);

    let engine = AssignmentEngine::new(
        store,
        Notifier::new(sink, metrics.clone()),
        config,
        metrics.clone(),
        events_tx,
    );

    (engine, metrics)
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 11, 2).unwrap()
}

fn worker(id_seed: u128, name: &str, postal_code: &str, rating: f64) -> WorkerProfile {
    WorkerProfile {
        id: Uuid::from_u128(id_seed),
        name: name.to_string(),
        phone: Some("+49 30 1234".to_string()),
        location: Location {
            point: None,
            postal_code: Some(postal_code.to_string()),
        },
        service_radius_km: 30.0,
        weekly_schedule: WeeklySchedule::every_day(hm(7, 0), hm(20, 0)),
        coverage_zones: Vec::new(),
        services: Vec::new(),
        rating,
        total_completed_jobs: 12,
        experience_years: 4.0,
        hourly_rate: 28.0,
        is_available: true,
        is_active: true,
        background_approved: true,
        last_active_at: Some(Utc::now()),
        updated_at: Utc::now(),
    }
}

fn request(postal_code: &str, start: NaiveTime, hours: f64) -> ServiceRequest {
    let now = Utc::now();
    ServiceRequest {
        id: Uuid::new_v4(),
        customer_id: Uuid::new_v4(),
        customer_name: "Carla".to_string(),
        service_type: "standard".to_string(),
        date: day(),
        start_time: start,
        duration_hours: hours,
        address: "Invalidenstr. 1".to_string(),
        location: Location {
            point: None,
            postal_code: Some(postal_code.to_string()),
        },
        status: RequestStatus::Unassigned,
        assigned_worker_id: None,
        assignment_attempts: 0,
        assigned_at: None,
        assigned_by_operator: false,
        status_changed_at: now,
        created_at: now,
    }
}

fn commitment(worker: &WorkerProfile, start: NaiveTime, hours: f64) -> ServiceRequest {
    let mut r = request("10115", start, hours);
    r.status = RequestStatus::Assigned;
    r.assigned_worker_id = Some(worker.id);
    r.assigned_at = Some(Utc::now());
    r
}

fn operator(store: &MemoryStore) -> Operator {
    let operator = Operator {
        id: Uuid::new_v4(),
        name: "Ops".to_string(),
        active: true,
    };
    store.insert_operator(operator.clone());
    operator
}

#[tokio::test]
async fn local_worker_beats_better_rated_distant_one() {
    let store = Arc::new(MemoryStore::new());
    let a = worker(1, "Anna", "10115", 4.8);
    let b = worker(2, "Ben", "80331", 5.0);
    store.insert_worker(a.clone());
    store.insert_worker(b.clone());
    store.insert_request(commitment(&b, hm(14, 0), 2.0));

    let req = request("10115", hm(9, 0), 2.0);
    store.insert_request(req.clone());

    let (engine, _outbox, _metrics) = engine(store.clone());
    let outcome = engine.attempt_assignment(req.id).await.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.worker.unwrap().id, a.id);
    assert_eq!(outcome.attempts, 1);

    let stored = store.get_request(req.id).unwrap();
    assert_eq!(stored.status, RequestStatus::Assigned);
    assert_eq!(stored.assigned_worker_id, Some(a.id));
    assert!(stored.assigned_at.is_some());
    assert!(!stored.assigned_by_operator);
}

#[tokio::test]
async fn locked_top_candidate_falls_through_to_next() {
    let store = Arc::new(MemoryStore::new());
    let a = worker(1, "Anna", "10115", 4.8);
    let b = worker(2, "Ben", "10117", 4.8);
    store.insert_worker(a.clone());
    store.insert_worker(b.clone());

    let req = request("10115", hm(9, 0), 2.0);
    store.insert_request(req.clone());

    let (engine, _outbox, metrics) = engine(store.clone());

    let ranked = engine.preview(req.id).await.unwrap();
    assert_eq!(ranked[0].candidate.worker.id, a.id);

    let mut held = store.begin().await.unwrap();
    assert!(matches!(held.lock_worker(a.id).await, LockOutcome::Locked));

    let outcome = engine.attempt_assignment(req.id).await.unwrap();
    held.rollback().await;

    assert!(outcome.success);
    assert_eq!(outcome.worker.unwrap().id, b.id);
    assert_eq!(metrics.lock_busy_total.get(), 1);
    assert_eq!(
        store.get_request(req.id).unwrap().assigned_worker_id,
        Some(b.id)
    );
}

#[tokio::test]
async fn no_candidates_moves_request_to_pending_manual() {
    let store = Arc::new(MemoryStore::new());
    let ops = operator(&store);
    let req = request("10115", hm(9, 0), 2.0);
    store.insert_request(req.clone());

    let (engine, outbox, _metrics) = engine(store.clone());
    let outcome = engine.attempt_assignment(req.id).await.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.reason.as_deref(), Some(NO_ELIGIBLE_WORKER));
    assert_eq!(outcome.status, RequestStatus::PendingManual);

    let stored = store.get_request(req.id).unwrap();
    assert_eq!(stored.status, RequestStatus::PendingManual);
    assert_eq!(stored.assignment_attempts, 1);

    let alerts = outbox.for_user(ops.id);
    assert_eq!(alerts.len(), 1);
    assert_eq!(
        alerts[0].category,
        NotificationCategory::ManualAssignmentRequired
    );
    assert_eq!(alerts[0].metadata["zone"], "101");
}

#[tokio::test]
async fn every_ranked_candidate_busy_escalates_to_pending_manual() {
    let store = Arc::new(MemoryStore::new());
    let ops = operator(&store);
    let a = worker(1, "Anna", "10115", 4.8);
    let b = worker(2, "Ben", "10117", 4.8);
    store.insert_worker(a.clone());
    store.insert_worker(b.clone());

    let req = request("10115", hm(9, 0), 2.0);
    store.insert_request(req.clone());

    let (engine, outbox, metrics) = engine(store.clone());
    assert_eq!(engine.preview(req.id).await.unwrap().len(), 2);

    let mut held = store.begin().await.unwrap();
    assert!(matches!(held.lock_worker(a.id).await, LockOutcome::Locked));
    assert!(matches!(held.lock_worker(b.id).await, LockOutcome::Locked));

    let outcome = engine.attempt_assignment(req.id).await.unwrap();
    held.rollback().await;

    assert!(!outcome.success);
    assert_eq!(outcome.reason.as_deref(), Some(NO_ELIGIBLE_WORKER));
    assert_eq!(outcome.status, RequestStatus::PendingManual);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(metrics.lock_busy_total.get(), 2);

    let stored = store.get_request(req.id).unwrap();
    assert_eq!(stored.status, RequestStatus::PendingManual);
    assert!(stored.assigned_worker_id.is_none());

    let alerts = outbox.for_user(ops.id);
    assert_eq!(alerts.len(), 1);
    assert_eq!(
        alerts[0].category,
        NotificationCategory::ManualAssignmentRequired
    );
}

#[tokio::test]
async fn late_evening_request_fits_schedule_open_until_midnight() {
    let store = Arc::new(MemoryStore::new());
    let mut night = worker(1, "Nora", "10115", 4.5);
    night.weekly_schedule = WeeklySchedule::every_day(hm(18, 0), NaiveTime::MIN);
    store.insert_worker(night.clone());

    let req = request("10115", hm(22, 0), 2.0);
    store.insert_request(req.clone());

    let (engine, _outbox, _metrics) = engine(store.clone());
    let outcome = engine.attempt_assignment(req.id).await.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.worker.unwrap().id, night.id);
}

#[tokio::test]
async fn huge_lookback_windows_saturate_instead_of_panicking() {
    let store = Arc::new(MemoryStore::new());
    store.insert_worker(worker(1, "Anna", "10115", 4.8));
    let req = request("10115", hm(9, 0), 2.0);
    store.insert_request(req.clone());

    let config = EngineConfig {
        staleness_days: 100_000_000,
        lookback_days: 100_000_000,
        ..EngineConfig::default()
    };
    let (engine, _metrics) = engine_with(store.clone(), config, Arc::new(MemoryOutbox::new()));

    assert_eq!(engine.preview(req.id).await.unwrap().len(), 1);
    let outcome = engine.attempt_assignment(req.id).await.unwrap();
    assert!(outcome.success);
}

struct BrokenSink;

impl NotificationSink for BrokenSink {
    fn enqueue(&self, _notification: Notification) -> Result<(), NotifyError> {
        Err(NotifyError::Unavailable("push gateway down".to_string()))
    }
}

#[tokio::test]
async fn failed_notifications_keep_the_committed_assignment() {
    let store = Arc::new(MemoryStore::new());
    let a = worker(1, "Anna", "10115", 4.8);
    store.insert_worker(a.clone());
    let req = request("10115", hm(9, 0), 2.0);
    store.insert_request(req.clone());

    let (engine, metrics) = engine_with(store.clone(), EngineConfig::default(), Arc::new(BrokenSink));
    let outcome = engine.attempt_assignment(req.id).await.unwrap();

    assert!(outcome.success);
    let stored = store.get_request(req.id).unwrap();
    assert_eq!(stored.status, RequestStatus::Assigned);
    assert_eq!(stored.assigned_worker_id, Some(a.id));
    assert_eq!(metrics.notification_failures_total.get(), 2);
    assert_eq!(
        metrics.assignments_total.with_label_values(&["assigned"]).get(),
        1
    );
}

#[tokio::test]
async fn worker_outside_service_radius_is_never_ranked() {
    let store = Arc::new(MemoryStore::new());
    let mut star = worker(1, "Star", "80331", 5.0);
    star.service_radius_km = 10.0;
    star.experience_years = 20.0;
    let plain = worker(2, "Plain", "10999", 3.0);
    store.insert_worker(star.clone());
    store.insert_worker(plain.clone());

    let req = request("10115", hm(9, 0), 2.0);
    store.insert_request(req.clone());

    let (engine, _outbox, _metrics) = engine(store.clone());

    let ranked = engine.preview(req.id).await.unwrap();
    assert!(ranked.iter().all(|d| d.candidate.worker.id != star.id));

    let outcome = engine.attempt_assignment(req.id).await.unwrap();
    assert_eq!(outcome.worker.unwrap().id, plain.id);
}

#[tokio::test]
async fn assigned_request_is_not_reassigned() {
    let store = Arc::new(MemoryStore::new());
    store.insert_worker(worker(1, "Anna", "10115", 4.8));
    let req = request("10115", hm(9, 0), 2.0);
    store.insert_request(req.clone());

    let (engine, outbox, _metrics) = engine(store.clone());
    engine.attempt_assignment(req.id).await.unwrap();
    let sent = outbox.len();

    let second = engine.attempt_assignment(req.id).await;

    assert!(matches!(second, Err(AppError::Conflict(_))));
    assert_eq!(outbox.len(), sent);
    assert_eq!(store.get_request(req.id).unwrap().assignment_attempts, 1);
}

#[tokio::test]
async fn success_notifies_customer_and_worker() {
    let store = Arc::new(MemoryStore::new());
    let a = worker(1, "Anna", "10115", 4.8);
    store.insert_worker(a.clone());
    let req = request("10115", hm(9, 0), 2.0);
    store.insert_request(req.clone());

    let (engine, outbox, _metrics) = engine(store.clone());
    engine.attempt_assignment(req.id).await.unwrap();

    let customer = outbox.for_user(req.customer_id);
    assert_eq!(customer.len(), 1);
    assert_eq!(customer[0].category, NotificationCategory::WorkerAssigned);
    assert_eq!(customer[0].metadata["worker_name"], "Anna");

    let assigned = outbox.for_user(a.id);
    assert_eq!(assigned.len(), 1);
    assert_eq!(assigned[0].category, NotificationCategory::NewAssignment);
    assert_eq!(assigned[0].metadata["customer_name"], "Carla");
}

#[tokio::test]
async fn retry_is_only_allowed_from_pending_manual() {
    let store = Arc::new(MemoryStore::new());
    let req = request("10115", hm(9, 0), 2.0);
    store.insert_request(req.clone());

    let (engine, _outbox, _metrics) = engine(store.clone());

    assert!(matches!(
        engine.retry_assignment(req.id).await,
        Err(AppError::Conflict(_))
    ));
    assert_eq!(store.get_request(req.id).unwrap().assignment_attempts, 0);

    let first = engine.attempt_assignment(req.id).await.unwrap();
    assert!(!first.success);

    store.insert_worker(worker(1, "Late", "10115", 4.0));
    let retried = engine.retry_assignment(req.id).await.unwrap();

    assert!(retried.success);
    assert_eq!(retried.attempts, 2);
    assert_eq!(retried.status, RequestStatus::Assigned);
}

#[tokio::test]
async fn invalid_request_is_rejected_before_counting_an_attempt() {
    let store = Arc::new(MemoryStore::new());
    let mut req = request("10115", hm(9, 0), 0.0);
    req.location = Location::default();
    store.insert_request(req.clone());

    let (engine, _outbox, _metrics) = engine(store.clone());

    assert!(matches!(
        engine.attempt_assignment(req.id).await,
        Err(AppError::BadRequest(_))
    ));
    assert_eq!(store.get_request(req.id).unwrap().assignment_attempts, 0);
    assert!(matches!(
        engine.attempt_assignment(Uuid::new_v4()).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn sub_minute_booking_is_rejected_as_invalid() {
    let store = Arc::new(MemoryStore::new());
    store.insert_worker(worker(1, "Anna", "10115", 4.8));
    let req = request("10115", hm(9, 0), 0.004);
    store.insert_request(req.clone());

    let (engine, outbox, _metrics) = engine(store.clone());

    assert!(matches!(
        engine.attempt_assignment(req.id).await,
        Err(AppError::BadRequest(_))
    ));
    let stored = store.get_request(req.id).unwrap();
    assert_eq!(stored.assignment_attempts, 0);
    assert_eq!(stored.status, RequestStatus::Unassigned);
    assert!(outbox.is_empty());
}

/// Delegates to a [`MemoryStore`] but can fail the candidate query or hide
/// commitments from the unlocked snapshot.
struct FaultyStore {
    inner: Arc<MemoryStore>,
    fail_candidates: AtomicBool,
    stale_snapshot: AtomicBool,
}

impl FaultyStore {
    fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_candidates: AtomicBool::new(false),
            stale_snapshot: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl AssignmentStore for FaultyStore {
    async fn request(&self, id: Uuid) -> Result<Option<ServiceRequest>, StoreError> {
        self.inner.request(id).await
    }

    async fn worker(&self, id: Uuid) -> Result<Option<WorkerProfile>, StoreError> {
        self.inner.worker(id).await
    }

    async fn eligible_workers(
        &self,
        query: &CandidateQuery,
    ) -> Result<Vec<WorkerProfile>, StoreError> {
        if self.fail_candidates.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        self.inner.eligible_workers(query).await
    }

    async fn active_commitments(
        &self,
        worker_id: Uuid,
    ) -> Result<Vec<ServiceRequest>, StoreError> {
        if self.stale_snapshot.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        self.inner.active_commitments(worker_id).await
    }

    async fn worker_stats(
        &self,
        worker_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<WorkerStats, StoreError> {
        let mut stats = self.inner.worker_stats(worker_id, since).await?;
        if self.stale_snapshot.load(Ordering::SeqCst) {
            stats.active_commitments = 0;
        }
        Ok(stats)
    }

    async fn active_operators(&self) -> Result<Vec<Operator>, StoreError> {
        self.inner.active_operators().await
    }

    async fn record_attempt(&self, request_id: Uuid) -> Result<ServiceRequest, StoreError> {
        self.inner.record_attempt(request_id).await
    }

    async fn mark_pending_manual(&self, request_id: Uuid) -> Result<ServiceRequest, StoreError> {
        self.inner.mark_pending_manual(request_id).await
    }

    async fn begin<'a>(&'a self) -> Result<Box<dyn AssignmentTx + 'a>, StoreError> {
        self.inner.begin().await
    }
}

#[tokio::test]
async fn store_failure_aborts_without_partial_writes() {
    let memory = Arc::new(MemoryStore::new());
    memory.insert_worker(worker(1, "Anna", "10115", 4.8));
    let ops = operator(&memory);
    let req = request("10115", hm(9, 0), 2.0);
    memory.insert_request(req.clone());

    let faulty = Arc::new(FaultyStore::new(memory.clone()));
    faulty.fail_candidates.store(true, Ordering::SeqCst);
    let (engine, outbox, metrics) = engine(faulty.clone());

    let result = engine.attempt_assignment(req.id).await;

    let err = result.unwrap_err();
    assert!(err.is_retryable());
    let stored = memory.get_request(req.id).unwrap();
    assert_eq!(stored.status, RequestStatus::Unassigned);
    assert_eq!(stored.assignment_attempts, 1);
    assert!(outbox.for_user(ops.id).is_empty());
    assert_eq!(
        metrics.assignments_total.with_label_values(&["error"]).get(),
        1
    );

    faulty.fail_candidates.store(false, Ordering::SeqCst);
    let outcome = engine.attempt_assignment(req.id).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.attempts, 2);
}

#[tokio::test]
async fn stale_snapshot_is_caught_by_recheck_under_lock() {
    let memory = Arc::new(MemoryStore::new());
    let a = worker(1, "Anna", "10115", 4.8);
    let b = worker(2, "Ben", "10117", 4.0);
    memory.insert_worker(a.clone());
    memory.insert_worker(b.clone());
    memory.insert_request(commitment(&a, hm(9, 30), 1.0));

    let req = request("10115", hm(9, 0), 2.0);
    memory.insert_request(req.clone());

    let faulty = Arc::new(FaultyStore::new(memory.clone()));
    faulty.stale_snapshot.store(true, Ordering::SeqCst);
    let (engine, _outbox, metrics) = engine(faulty);

    let outcome = engine.attempt_assignment(req.id).await.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.worker.unwrap().id, b.id);
    assert_eq!(metrics.recheck_rejections_total.get(), 1);
}

#[tokio::test]
async fn force_assign_requires_reason_to_override_conflicts() {
    let store = Arc::new(MemoryStore::new());
    let a = worker(1, "Anna", "10115", 4.8);
    store.insert_worker(a.clone());
    let existing = commitment(&a, hm(9, 0), 2.0);
    store.insert_request(existing.clone());

    let req = request("10115", hm(10, 0), 2.0);
    store.insert_request(req.clone());

    let (engine, outbox, metrics) = engine(store.clone());

    let refused = engine.force_assign(req.id, a.id, Some("   ".to_string())).await.unwrap();
    assert!(!refused.success);
    assert!(refused.had_conflicts);
    assert_eq!(refused.conflicting_requests, vec![existing.id]);
    assert_eq!(
        store.get_request(req.id).unwrap().status,
        RequestStatus::Unassigned
    );
    assert!(outbox.is_empty());

    let forced = engine
        .force_assign(req.id, a.id, Some("customer asked for Anna".to_string()))
        .await
        .unwrap();
    assert!(forced.success);
    assert!(forced.had_conflicts);
    assert_eq!(metrics.forced_assignments_total.get(), 1);

    let stored = store.get_request(req.id).unwrap();
    assert_eq!(stored.assigned_worker_id, Some(a.id));
    assert!(stored.assigned_by_operator);
    assert_eq!(outbox.for_user(a.id).len(), 1);
}

#[tokio::test]
async fn force_assign_without_conflicts_needs_no_reason() {
    let store = Arc::new(MemoryStore::new());
    let a = worker(1, "Anna", "80331", 4.8);
    store.insert_worker(a.clone());
    let req = request("10115", hm(10, 0), 2.0);
    store.insert_request(req.clone());

    let (engine, _outbox, _metrics) = engine(store.clone());
    let outcome = engine.force_assign(req.id, a.id, None).await.unwrap();

    assert!(outcome.success);
    assert!(!outcome.had_conflicts);
    assert_eq!(
        store.get_request(req.id).unwrap().status,
        RequestStatus::Assigned
    );

    assert!(matches!(
        engine.force_assign(req.id, Uuid::new_v4(), None).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn force_assign_moves_request_and_tells_previous_worker() {
    let store = Arc::new(MemoryStore::new());
    let a = worker(1, "Anna", "10115", 4.8);
    let b = worker(2, "Ben", "10117", 4.8);
    store.insert_worker(a.clone());
    store.insert_worker(b.clone());
    let req = request("10115", hm(9, 0), 2.0);
    store.insert_request(req.clone());

    let (engine, outbox, _metrics) = engine(store.clone());
    let outcome = engine.attempt_assignment(req.id).await.unwrap();
    assert_eq!(outcome.worker.unwrap().id, a.id);
    let sent = outbox.len();

    assert!(matches!(
        engine.force_assign(req.id, a.id, None).await,
        Err(AppError::Conflict(_))
    ));
    assert_eq!(outbox.len(), sent);

    let moved = engine.force_assign(req.id, b.id, None).await.unwrap();
    assert!(moved.success);

    let stored = store.get_request(req.id).unwrap();
    assert_eq!(stored.assigned_worker_id, Some(b.id));
    assert!(stored.assigned_by_operator);

    let to_previous = outbox.for_user(a.id);
    assert_eq!(to_previous.len(), 2);
    assert!(to_previous
        .iter()
        .any(|n| n.category == NotificationCategory::AssignmentWithdrawn));

    let to_new = outbox.for_user(b.id);
    assert_eq!(to_new.len(), 1);
    assert_eq!(to_new[0].category, NotificationCategory::NewAssignment);
}

#[tokio::test]
async fn force_assign_to_unknown_worker_leaves_request_untouched() {
    let store = Arc::new(MemoryStore::new());
    let req = request("10115", hm(9, 0), 2.0);
    store.insert_request(req.clone());

    let (engine, outbox, _metrics) = engine(store.clone());

    for _ in 0..3 {
        assert!(matches!(
            engine.force_assign(req.id, Uuid::new_v4(), None).await,
            Err(AppError::NotFound(_))
        ));
    }
    assert_eq!(
        store.get_request(req.id).unwrap().status,
        RequestStatus::Unassigned
    );
    assert!(outbox.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_attempts_never_double_book_a_worker() {
    let store = Arc::new(MemoryStore::new());
    let workers: Vec<WorkerProfile> = (1..=3)
        .map(|seed| worker(seed, &format!("W{seed}"), "10115", 4.0 + seed as f64 / 10.0))
        .collect();
    for w in &workers {
        store.insert_worker(w.clone());
    }

    let mut request_ids = Vec::new();
    for _ in 0..60 {
        let noise = Uuid::new_v4().as_u128();
        let start_hour = 8 + (noise % 9) as u32;
        let start_minute = if (noise >> 8) % 2 == 0 { 0 } else { 30 };
        let hours = 1.0 + ((noise >> 16) % 3) as f64;
        let req = request("10115", hm(start_hour, start_minute), hours);
        request_ids.push(req.id);
        store.insert_request(req);
    }

    let (engine, _outbox, _metrics) = engine(store.clone());

    let handles: Vec<_> = request_ids
        .iter()
        .map(|&id| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.attempt_assignment(id).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let all = store.list_requests();
    assert!(all.iter().all(|r| matches!(
        r.status,
        RequestStatus::Assigned | RequestStatus::PendingManual
    )));
    assert!(all.iter().any(|r| r.status == RequestStatus::Assigned));

    for w in &workers {
        let mine: Vec<&ServiceRequest> = all
            .iter()
            .filter(|r| r.is_active_commitment_of(w.id))
            .collect();
        for (i, left) in mine.iter().enumerate() {
            for right in &mine[i + 1..] {
                assert!(
                    !left.window().overlaps(&right.window()),
                    "worker {} double booked: {:?} vs {:?}",
                    w.name,
                    left.window(),
                    right.window()
                );
            }
        }
    }
}
