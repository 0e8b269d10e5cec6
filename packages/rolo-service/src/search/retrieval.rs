use std::collections::HashSet;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use rolo_config::Config;

use crate::{
	EmbeddingProvider, Error, Result, VectorHit, VectorIndex, guard,
	search::{ThresholdStats, ranking},
	stage::SearchStage,
};

/// Embeds the enhanced query. Any failure is critical.
pub async fn embed_query(
	cfg: &Config,
	provider: &dyn EmbeddingProvider,
	enhanced_query: &str,
	cancel: &CancellationToken,
) -> Result<Vec<f32>> {
	let stage = SearchStage::Embedding;
	let embedding_cfg = &cfg.providers.embedding;
	let text = match embedding_cfg.query_prefix.as_deref() {
		Some(prefix) => format!("{prefix}{enhanced_query}"),
		None => enhanced_query.to_string(),
	};
	let texts = [text];
	let vectors = guard::guarded(
		stage,
		cfg.search.timeouts.embed_ms,
		cancel,
		provider.embed(embedding_cfg, &texts),
	)
	.await
	.map_err(|err| Error::critical(stage, err))?;

	if vectors.len() != 1 {
		return Err(Error::CriticalStage {
			stage,
			message: format!(
				"Embedding provider returned {} vectors for one query.",
				vectors.len()
			),
		});
	}

	let Some(vector) = vectors.into_iter().next() else {
		return Err(Error::CriticalStage {
			stage,
			message: "Embedding provider returned no vectors.".to_string(),
		});
	};
	let expected = cfg.storage.qdrant.vector_dim as usize;

	if vector.len() != expected {
		return Err(Error::CriticalStage {
			stage,
			message: format!(
				"Embedding vector dimension mismatch: expected {expected}, got {}.",
				vector.len()
			),
		});
	}

	Ok(vector)
}

/// Queries the index, clamps scores into [0, 1], and drops repeated ids.
pub async fn search_vectors(
	cfg: &Config,
	index: &dyn VectorIndex,
	vector: &[f32],
	owner_id: Uuid,
	cancel: &CancellationToken,
) -> Result<Vec<VectorHit>> {
	let stage = SearchStage::VectorSearching;
	let hits = guard::guarded(
		stage,
		cfg.search.timeouts.vector_ms,
		cancel,
		index.search(vector, cfg.search.vector_top_k, owner_id),
	)
	.await
	.map_err(|err| Error::critical(stage, err))?;
	let mut seen = HashSet::new();

	Ok(hits
		.into_iter()
		.filter(|hit| seen.insert(hit.id))
		.map(|hit| VectorHit { id: hit.id, score: ranking::clamp_vector_score(hit.score) })
		.collect())
}

/// Keeps hits scoring at least `min_score`. Without a threshold nothing is removed and no stats
/// are reported.
pub fn apply_vector_threshold(
	hits: Vec<VectorHit>,
	min_score: Option<f32>,
) -> (Vec<VectorHit>, Option<ThresholdStats>) {
	let Some(threshold) = min_score else {
		return (hits, None);
	};
	let raw_count = hits.len();
	let kept: Vec<VectorHit> = hits.into_iter().filter(|hit| hit.score >= threshold).collect();
	let stats = ThresholdStats {
		threshold_used: threshold,
		raw_count,
		filtered_count: kept.len(),
		removed_count: raw_count - kept.len(),
	};

	(kept, Some(stats))
}
