use tokio_util::sync::CancellationToken;

use rolo_config::Config;

use crate::{
	ContactRecord, Error, RerankProvider, guard,
	search::{
		RerankFilteringStats, ScoringMethod,
		ranking::{self, Candidate, ScoreNormalization},
	},
	stage::{SearchStage, StageOutcome},
};

pub struct RerankOutcome {
	pub candidates: Vec<Candidate>,
	pub scoring_method: ScoringMethod,
	pub documents_reranked: usize,
	pub filtering_stats: Option<RerankFilteringStats>,
	pub cost: f64,
}

/// One labelled line per non-empty field, in a fixed order.
pub fn build_document(contact: &ContactRecord) -> String {
	contact
		.labelled_fields()
		.into_iter()
		.map(|(label, value)| format!("{label}: {value}"))
		.collect::<Vec<_>>()
		.join("\n")
}

pub struct Reranker<'a> {
	cfg: &'a Config,
	provider: &'a dyn RerankProvider,
}
impl<'a> Reranker<'a> {
	pub fn new(cfg: &'a Config, provider: &'a dyn RerankProvider) -> Self {
		Self { cfg, provider }
	}

	/// Scores hydrated candidates against the preprocessed query and fuses them with their vector
	/// scores.
	pub async fn rerank(
		&self,
		rerank_query: &str,
		candidates: Vec<Candidate>,
		min_rerank_score: Option<f32>,
		cancel: &CancellationToken,
	) -> StageOutcome<RerankOutcome> {
		if candidates.is_empty() {
			return StageOutcome::Ok(RerankOutcome {
				candidates,
				scoring_method: ScoringMethod::Rerank,
				documents_reranked: 0,
				filtering_stats: min_rerank_score.map(|threshold| RerankFilteringStats {
					threshold_used: threshold,
					raw_count: 0,
					filtered_count: 0,
					removed_count: 0,
					fallback_applied: false,
				}),
				cost: 0.0,
			});
		}

		let stage = SearchStage::Reranking;
		let rerank_cfg = &self.cfg.providers.rerank;
		let docs: Vec<String> =
			candidates.iter().map(|candidate| build_document(&candidate.contact)).collect();
		let result = guard::guarded(
			stage,
			self.cfg.search.timeouts.rerank_ms,
			cancel,
			self.provider.rerank(rerank_cfg, rerank_query, &docs),
		)
		.await
		.and_then(|scores| {
			if scores.len() == docs.len() {
				Ok(scores)
			} else {
				Err(Error::Provider {
					message: format!(
						"Rerank provider returned {} scores for {} documents.",
						scores.len(),
						docs.len()
					),
				})
			}
		});
		let raw_scores = match result {
			Ok(scores) => scores,
			Err(err) if err.is_cancelled() => return StageOutcome::Fatal(err),
			Err(err) => {
				let message = format!(
					"Rerank failed for {} candidates via {}: {err}",
					docs.len(),
					rerank_cfg.provider_id
				);

				if !self.cfg.search.rerank.fallback_on_error {
					return StageOutcome::Fatal(Error::CriticalStage { stage, message });
				}

				tracing::warn!(
					error = %err,
					candidates = docs.len(),
					provider_id = rerank_cfg.provider_id.as_str(),
					"Rerank failed; falling back to vector ranking."
				);

				let mut candidates = candidates;

				ranking::sort_candidates(&mut candidates, ScoringMethod::Vector);

				return StageOutcome::Degraded(
					RerankOutcome {
						candidates,
						scoring_method: ScoringMethod::Vector,
						documents_reranked: 0,
						filtering_stats: None,
						cost: 0.0,
					},
					message,
				);
			},
		};
		let normalization = ScoreNormalization::parse(&self.cfg.search.rerank.score_normalization);
		let scored: Vec<Candidate> = candidates
			.into_iter()
			.zip(raw_scores)
			.map(|(candidate, raw)| {
				let rerank_score = normalization.apply(raw);
				let hybrid =
					ranking::hybrid_score(candidate.vector_score, rerank_score, &self.cfg.ranking);

				Candidate {
					rerank_score: Some(rerank_score),
					hybrid_score: Some(hybrid),
					..candidate
				}
			})
			.collect();
		let documents_reranked = docs.len();
		let cost = documents_reranked as f64 * rerank_cfg.cost_per_1k_documents / 1_000.0;
		let (candidates, scoring_method, filtering_stats) =
			apply_rerank_threshold(scored, min_rerank_score);

		StageOutcome::Ok(RerankOutcome {
			candidates,
			scoring_method,
			documents_reranked,
			filtering_stats,
			cost,
		})
	}
}

/// Drops candidates under the rerank threshold. When that would drop everything, the full set
/// is returned ranked by vector score instead. The stats still count what the threshold
/// removed.
pub fn apply_rerank_threshold(
	mut scored: Vec<Candidate>,
	min_rerank_score: Option<f32>,
) -> (Vec<Candidate>, ScoringMethod, Option<RerankFilteringStats>) {
	let Some(threshold) = min_rerank_score else {
		ranking::sort_candidates(&mut scored, ScoringMethod::Rerank);

		return (scored, ScoringMethod::Rerank, None);
	};
	let raw_count = scored.len();
	let passes = |candidate: &Candidate| candidate.rerank_score.unwrap_or(0.0) >= threshold;
	let filtered_count = scored.iter().filter(|candidate| passes(candidate)).count();

	if filtered_count == 0 && raw_count > 0 {
		tracing::info!(
			threshold,
			raw_count,
			"Rerank threshold removed every candidate; ranking by vector score."
		);

		for candidate in &mut scored {
			candidate.hybrid_score = None;
		}

		ranking::sort_candidates(&mut scored, ScoringMethod::Vector);

		let stats = RerankFilteringStats {
			threshold_used: threshold,
			raw_count,
			filtered_count: 0,
			removed_count: raw_count,
			fallback_applied: true,
		};

		return (scored, ScoringMethod::Vector, Some(stats));
	}

	scored.retain(|candidate| passes(candidate));
	ranking::sort_candidates(&mut scored, ScoringMethod::Rerank);

	let stats = RerankFilteringStats {
		threshold_used: threshold,
		raw_count,
		filtered_count,
		removed_count: raw_count - filtered_count,
		fallback_applied: false,
	};

	(scored, ScoringMethod::Rerank, Some(stats))
}
