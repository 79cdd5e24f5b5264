use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use crate::error::NotifyError;
use crate::models::notification::{Notification, NotificationCategory};
use crate::models::operator::Operator;
use crate::models::request::ServiceRequest;
use crate::models::worker::WorkerProfile;
use crate::observability::metrics::Metrics;

/// Outbound side of the notification subsystem. Delivery is someone else's job.
pub trait NotificationSink: Send + Sync {
    fn enqueue(&self, notification: Notification) -> Result<(), NotifyError>;
}

#[derive(Default)]
pub struct MemoryOutbox {
    notifications: DashMap<Uuid, Notification>,
}

impl MemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_user(&self, user_id: Uuid) -> Vec<Notification> {
        let mut found: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|entry| entry.value().user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by_key(|notification| notification.created_at);
        found
    }

    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }
}

impl NotificationSink for MemoryOutbox {
    fn enqueue(&self, notification: Notification) -> Result<(), NotifyError> {
        self.notifications.insert(notification.id, notification);
        Ok(())
    }
}

/// Builds the engine's messages and hands them to the sink. Failures are
/// logged and counted, never returned.
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
    metrics: Metrics,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>, metrics: Metrics) -> Self {
        Self { sink, metrics }
    }

    pub fn assignment_committed(&self, request: &ServiceRequest, worker: &WorkerProfile) {
        let window = request.window();

        self.enqueue(
            request.customer_id,
            "Worker assigned",
            format!(
                "{} will handle your {} service on {}. Rating {:.1}/5.",
                worker.name,
                request.service_type,
                window.start.format("%Y-%m-%d %H:%M"),
                worker.rating
            ),
            NotificationCategory::WorkerAssigned,
            json!({
                "request_id": request.id,
                "worker_id": worker.id,
                "worker_name": worker.name,
                "worker_phone": worker.phone,
                "worker_rating": worker.rating,
            }),
        );

        self.enqueue(
            worker.id,
            "New assignment",
            format!(
                "{} booked {} at {} on {} for {} hours.",
                request.customer_name,
                request.service_type,
                request.address,
                window.start.format("%Y-%m-%d %H:%M"),
                request.duration_hours
            ),
            NotificationCategory::NewAssignment,
            json!({
                "request_id": request.id,
                "customer_name": request.customer_name,
                "address": request.address,
                "postal_code": request.location.postal_code,
                "start": window.start,
                "end": window.end,
                "duration_hours": request.duration_hours,
            }),
        );
    }

    pub fn assignment_withdrawn(&self, request: &ServiceRequest, previous_worker_id: Uuid) {
        let window = request.window();

        self.enqueue(
            previous_worker_id,
            "Assignment withdrawn",
            format!(
                "The {} job for {} on {} was reassigned by an operator.",
                request.service_type,
                request.customer_name,
                window.start.format("%Y-%m-%d %H:%M"),
            ),
            NotificationCategory::AssignmentWithdrawn,
            json!({
                "request_id": request.id,
                "start": window.start,
                "end": window.end,
            }),
        );
    }

    pub fn manual_assignment_required(&self, request: &ServiceRequest, operators: &[Operator]) {
        let window = request.window();
        let zone = request
            .location
            .postal_code
            .as_deref()
            .map(crate::geo::zone_of)
            .unwrap_or_else(|| "unknown".to_string());

        if operators.is_empty() {
            warn!(request_id = %request.id, "no active operators to alert");
        }

        for operator in operators {
            self.enqueue(
                operator.id,
                "Manual assignment required",
                format!(
                    "Request {} in zone {} ({} - {}) has no eligible worker after {} attempt(s).",
                    request.id,
                    zone,
                    window.start.format("%Y-%m-%d %H:%M"),
                    window.end.format("%H:%M"),
                    request.assignment_attempts
                ),
                NotificationCategory::ManualAssignmentRequired,
                json!({
                    "request_id": request.id,
                    "zone": zone,
                    "start": window.start,
                    "end": window.end,
                    "attempts": request.assignment_attempts,
                }),
            );
        }
    }

    pub fn enqueue(
        &self,
        user_id: Uuid,
        title: &str,
        body: String,
        category: NotificationCategory,
        metadata: Value,
    ) {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id,
            title: title.to_string(),
            body,
            category,
            metadata,
            created_at: Utc::now(),
        };

        if let Err(err) = self.sink.enqueue(notification) {
            self.metrics.notification_failures_total.inc();
            warn!(user_id = %user_id, ?category, error = %err, "failed to enqueue notification");
        }
    }
}
