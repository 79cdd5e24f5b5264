use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::StoreError;
use crate::models::assignment::Candidate;
use crate::models::request::ServiceRequest;
use crate::store::{AssignmentStore, CandidateQuery};

/// Unlocked snapshot of every worker who could plausibly take `request`.
/// Order is unspecified and nothing here is trusted at commit time.
pub async fn find_candidates(
    store: &dyn AssignmentStore,
    request: &ServiceRequest,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> Result<Vec<Candidate>, StoreError> {
    let query = CandidateQuery {
        service_type: Some(request.service_type.clone()),
        active_since: config.active_since(now),
        near: request.location.point,
    };
    let workers = store.eligible_workers(&query).await?;
    let history_since = config.history_since(now);

    let candidates = try_join_all(workers.into_iter().map(|worker| async move {
        let stats = store.worker_stats(worker.id, history_since).await?;
        let commitments = store.active_commitments(worker.id).await?;
        Ok::<_, StoreError>(Candidate {
            worker,
            stats,
            commitments,
        })
    }))
    .await?;

    debug!(
        request_id = %request.id,
        candidates = candidates.len(),
        "candidate snapshot loaded"
    );

    Ok(candidates)
}
