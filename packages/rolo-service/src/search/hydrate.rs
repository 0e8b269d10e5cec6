use std::collections::HashMap;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
	ContactStore, VectorHit, guard,
	search::ranking::Candidate,
	stage::{SearchStage, StageOutcome},
};

/// Loads full contacts for the vector hits, in vector order. Storage failures degrade to an
/// empty candidate list.
pub async fn hydrate(
	store: &dyn ContactStore,
	hits: &[VectorHit],
	owner_id: Uuid,
	timeout_ms: u64,
	cancel: &CancellationToken,
) -> StageOutcome<Vec<Candidate>> {
	if hits.is_empty() {
		return StageOutcome::Ok(Vec::new());
	}

	let ids: Vec<Uuid> = hits.iter().map(|hit| hit.id).collect();
	let records = match guard::guarded(
		SearchStage::Hydrating,
		timeout_ms,
		cancel,
		store.get_many(&ids, owner_id),
	)
	.await
	{
		Ok(records) => records,
		Err(err) if err.is_cancelled() => return StageOutcome::Fatal(err),
		Err(err) => {
			tracing::warn!(error = %err, candidates = ids.len(), "Contact hydration failed.");

			return StageOutcome::Degraded(Vec::new(), format!("Contact hydration failed: {err}"));
		},
	};
	let mut by_id: HashMap<Uuid, _> = records
		.into_iter()
		.filter(|record| record.owner_id == owner_id)
		.map(|record| (record.id, record))
		.collect();
	let candidates: Vec<Candidate> = hits
		.iter()
		.filter_map(|hit| by_id.remove(&hit.id).map(|record| Candidate::new(record, hit.score)))
		.collect();

	if candidates.len() < hits.len() {
		tracing::debug!(
			requested = hits.len(),
			hydrated = candidates.len(),
			"Dropped vector hits without a live contact."
		);
	}

	StageOutcome::Ok(candidates)
}
