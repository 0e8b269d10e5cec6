pub mod cache;
pub mod enhance;
pub mod hydrate;
pub mod ranking;
pub mod rerank;
pub mod retrieval;

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use rolo_config::Config;
use rolo_domain::{
	language::Language,
	query_text::{self, MAX_QUERY_TAGS},
};

use crate::{
	ContactRecord, Error, Result, RoloService, SessionStep, SessionSummary, TokenUsage, guard,
	search::{
		cache::TieredQueryCache,
		enhance::{DISABLED_REASON, QueryEnhancer},
		ranking::Candidate,
		rerank::Reranker,
	},
	stage::{DegradedStage, SearchStage, StageMachine, StageOutcome},
};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
	pub query: String,
	#[serde(default)]
	pub min_vector_score: Option<f32>,
	#[serde(default)]
	pub min_rerank_score: Option<f32>,
	/// Falls back to `search.include_rerank_default` when absent.
	#[serde(default)]
	pub include_rerank: Option<bool>,
	#[serde(default)]
	pub track_steps: bool,
	#[serde(default)]
	pub limit: Option<u32>,
}
impl SearchRequest {
	pub fn new(query: impl Into<String>) -> Self {
		Self {
			query: query.into(),
			min_vector_score: None,
			min_rerank_score: None,
			include_rerank: None,
			track_steps: false,
			limit: None,
		}
	}
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
	pub results: Vec<ScoredResult>,
	pub search_metadata: SearchMetadata,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedQuery {
	pub original_query: String,
	pub enhanced_query: String,
	pub language: Language,
	pub metadata: EnhancementMetadata,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancementMetadata {
	pub cache_type: CacheType,
	pub cached: bool,
	pub cost: f64,
	pub duration_ms: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tokens_used: Option<TokenUsage>,
	pub enhance_id: Uuid,
}

/// Where an enhanced query came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheType {
	Static,
	/// The shared tier. Kept as "redis" on the wire.
	#[serde(rename = "redis")]
	Distributed,
	Ai,
	Fallback,
}
impl CacheType {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Static => "static",
			Self::Distributed => "redis",
			Self::Ai => "ai",
			Self::Fallback => "fallback",
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancementSummary {
	pub cache_type: CacheType,
	pub cached: bool,
	pub duration_ms: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tokens_used: Option<TokenUsage>,
	pub enhance_id: Uuid,
}
impl From<&EnhancementMetadata> for EnhancementSummary {
	fn from(metadata: &EnhancementMetadata) -> Self {
		Self {
			cache_type: metadata.cache_type,
			cached: metadata.cached,
			duration_ms: metadata.duration_ms,
			tokens_used: metadata.tokens_used,
			enhance_id: metadata.enhance_id,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdStats {
	pub threshold_used: f32,
	pub raw_count: usize,
	pub filtered_count: usize,
	pub removed_count: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RerankFilteringStats {
	pub threshold_used: f32,
	pub raw_count: usize,
	pub filtered_count: usize,
	pub removed_count: usize,
	pub fallback_applied: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMethod {
	Rerank,
	Vector,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RerankMetadata {
	/// Milliseconds spent in the rerank stage.
	pub duration: u64,
	pub documents_reranked: usize,
	pub scoring_method: ScoringMethod,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub filtering_stats: Option<RerankFilteringStats>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Costs {
	pub enhancement: f64,
	pub rerank: f64,
	pub total: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timings {
	pub enhancement_ms: u64,
	pub embedding_ms: u64,
	pub vector_search_ms: u64,
	pub hydration_ms: u64,
	pub rerank_ms: u64,
	pub total_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMetadata {
	pub query: String,
	pub enhanced_query: String,
	pub language: Language,
	pub query_tags: Vec<String>,
	pub enhancement: EnhancementSummary,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub threshold_filtering: Option<ThresholdStats>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub rerank: Option<RerankMetadata>,
	pub costs: Costs,
	pub timings: Timings,
	pub degraded: Vec<DegradedStage>,
	pub session_id: Uuid,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredResult {
	pub contact: ContactRecord,
	pub search_metadata: ResultMetadata,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub rerank_score: Option<f32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub hybrid_score: Option<f32>,
	pub vector_score: f32,
	pub matched_fields: Vec<String>,
}

impl RoloService {
	pub async fn search(&self, owner_id: Uuid, req: SearchRequest) -> Result<SearchResponse> {
		self.search_with_cancel(owner_id, req, &CancellationToken::new()).await
	}

	/// Runs the full pipeline. Cancelling `cancel` aborts at the next external call.
	pub async fn search_with_cancel(
		&self,
		owner_id: Uuid,
		req: SearchRequest,
		cancel: &CancellationToken,
	) -> Result<SearchResponse> {
		let mut machine = StageMachine::new();
		let result = self.run_pipeline(owner_id, &req, cancel, &mut machine).await;

		if let Err(err) = &result {
			let stage = machine.current();
			let failed = machine.fail();

			tracing::warn!(error = %err, stage = stage.as_str(), failed, "Search aborted.");
		}

		result
	}

	async fn run_pipeline(
		&self,
		owner_id: Uuid,
		req: &SearchRequest,
		cancel: &CancellationToken,
		machine: &mut StageMachine,
	) -> Result<SearchResponse> {
		let started = Instant::now();

		validate_request(&self.cfg, req)?;

		let session_id = Uuid::new_v4();
		let query = req.query.trim();
		let mut degraded = Vec::new();
		let mut timings = Timings::default();

		machine.advance(SearchStage::Enhancing)?;

		let stage_started = Instant::now();
		let enhanced = self
			.resolve_enhancement(query, cancel)
			.await
			.resolve(SearchStage::Enhancing, &mut degraded)?;

		timings.enhancement_ms = elapsed_ms(stage_started);
		self.track_step(
			req,
			session_id,
			SearchStage::Enhancing,
			timings.enhancement_ms,
			enhanced.metadata.cost,
		);
		machine.advance(SearchStage::Embedding)?;

		let stage_started = Instant::now();
		let vector = retrieval::embed_query(
			&self.cfg,
			self.providers.embedding.as_ref(),
			&enhanced.enhanced_query,
			cancel,
		)
		.await?;

		timings.embedding_ms = elapsed_ms(stage_started);
		self.track_step(req, session_id, SearchStage::Embedding, timings.embedding_ms, 0.0);
		machine.advance(SearchStage::VectorSearching)?;

		let stage_started = Instant::now();
		let hits = retrieval::search_vectors(
			&self.cfg,
			self.stores.vector_index.as_ref(),
			&vector,
			owner_id,
			cancel,
		)
		.await?;
		let (hits, threshold_filtering) =
			retrieval::apply_vector_threshold(hits, req.min_vector_score);

		timings.vector_search_ms = elapsed_ms(stage_started);
		self.track_step(
			req,
			session_id,
			SearchStage::VectorSearching,
			timings.vector_search_ms,
			0.0,
		);
		machine.advance(SearchStage::Hydrating)?;

		let stage_started = Instant::now();
		let candidates = hydrate::hydrate(
			self.stores.contacts.as_ref(),
			&hits,
			owner_id,
			self.cfg.search.timeouts.hydrate_ms,
			cancel,
		)
		.await
		.resolve(SearchStage::Hydrating, &mut degraded)?;

		timings.hydration_ms = elapsed_ms(stage_started);
		self.track_step(req, session_id, SearchStage::Hydrating, timings.hydration_ms, 0.0);

		let rerank_query = query_text::preprocess_for_rerank(query);
		let include_rerank = req.include_rerank.unwrap_or(self.cfg.search.include_rerank_default);
		let mut rerank_cost = 0.0;
		let (candidates, rerank_metadata) = if include_rerank {
			machine.advance(SearchStage::Reranking)?;

			let stage_started = Instant::now();
			let outcome = Reranker::new(&self.cfg, self.providers.rerank.as_ref())
				.rerank(&rerank_query, candidates, req.min_rerank_score, cancel)
				.await
				.resolve(SearchStage::Reranking, &mut degraded)?;

			timings.rerank_ms = elapsed_ms(stage_started);
			rerank_cost = outcome.cost;
			self.track_step(
				req,
				session_id,
				SearchStage::Reranking,
				timings.rerank_ms,
				rerank_cost,
			);

			let metadata = RerankMetadata {
				duration: timings.rerank_ms,
				documents_reranked: outcome.documents_reranked,
				scoring_method: outcome.scoring_method,
				filtering_stats: outcome.filtering_stats,
			};

			(outcome.candidates, Some(metadata))
		} else {
			let mut candidates = candidates;

			ranking::sort_candidates(&mut candidates, ScoringMethod::Vector);

			(candidates, None)
		};

		machine.advance(SearchStage::Finalizing)?;

		let query_tags = query_text::query_tags(&rerank_query, MAX_QUERY_TAGS);
		let results = build_results(candidates, result_limit(&self.cfg, req), &query_tags);
		let costs = Costs {
			enhancement: enhanced.metadata.cost,
			rerank: rerank_cost,
			total: enhanced.metadata.cost + rerank_cost,
		};

		timings.total_ms = elapsed_ms(started);

		if self.cfg.search.sessions.enabled {
			let summary = SessionSummary {
				session_id,
				owner_id,
				query: query.to_string(),
				enhanced_query: enhanced.enhanced_query.clone(),
				cache_type: enhanced.metadata.cache_type,
				costs,
				result_count: results.len(),
				duration_ms: timings.total_ms,
				recorded_at: OffsetDateTime::now_utc(),
			};

			self.record_session(summary, cancel)
				.await
				.resolve(SearchStage::Finalizing, &mut degraded)?;
		}

		machine.advance(SearchStage::Done)?;

		tracing::info!(
			session_id = %session_id,
			cache_type = enhanced.metadata.cache_type.as_str(),
			language = enhanced.language.code(),
			result_count = results.len(),
			degraded = degraded.len(),
			total_cost = costs.total,
			total_ms = timings.total_ms,
			"Search completed."
		);

		Ok(SearchResponse {
			results,
			search_metadata: SearchMetadata {
				query: query.to_string(),
				enhanced_query: enhanced.enhanced_query.clone(),
				language: enhanced.language,
				query_tags,
				enhancement: EnhancementSummary::from(&enhanced.metadata),
				threshold_filtering,
				rerank: rerank_metadata,
				costs,
				timings,
				degraded,
				session_id,
			},
		})
	}

	/// Static tier, shared tier, then the live enhancer. A live result is written back to the
	/// shared tier.
	async fn resolve_enhancement(
		&self,
		query: &str,
		cancel: &CancellationToken,
	) -> StageOutcome<EnhancedQuery> {
		let started = Instant::now();
		let cache = TieredQueryCache::new(&self.cfg, self.stores.query_cache.as_ref());

		if let Some(hit) = cache.lookup_static(query) {
			return StageOutcome::Ok(hit);
		}

		let key = cache.shared_key(query);

		if let Some(key) = key.as_deref() {
			match cache.lookup_shared(query, key, cancel).await {
				Ok(Some(hit)) => return StageOutcome::Ok(hit),
				Ok(None) => {},
				Err(err) => return StageOutcome::Fatal(err),
			}
		}

		if !self.cfg.search.enhancement.enabled {
			return StageOutcome::Degraded(
				enhance::fallback(query, started),
				DISABLED_REASON.to_string(),
			);
		}

		let outcome = QueryEnhancer::new(&self.cfg, self.providers.enhancer.as_ref())
			.enhance(query, cancel)
			.await;

		if let StageOutcome::Ok(enhanced) = &outcome
			&& let Some(key) = key.as_deref()
		{
			cache.store_shared(key, enhanced, cancel).await;
		}

		outcome
	}

	async fn record_session(
		&self,
		summary: SessionSummary,
		cancel: &CancellationToken,
	) -> StageOutcome<()> {
		let session_id = summary.session_id;

		match guard::guarded(
			SearchStage::Finalizing,
			self.cfg.search.timeouts.tracking_ms,
			cancel,
			self.stores.sessions.record_session(summary),
		)
		.await
		{
			Ok(()) => StageOutcome::Ok(()),
			Err(err) => {
				tracing::warn!(error = %err, session_id = %session_id, "Session recording failed.");

				StageOutcome::Degraded((), format!("Session recording failed: {err}"))
			},
		}
	}

	/// Fire-and-forget step record. Failures are logged only.
	fn track_step(
		&self,
		req: &SearchRequest,
		session_id: Uuid,
		stage: SearchStage,
		duration_ms: u64,
		cost: f64,
	) {
		if !req.track_steps {
			return;
		}

		let tracker = self.stores.sessions.clone();
		let timeout = Duration::from_millis(self.cfg.search.timeouts.tracking_ms);
		let step = SessionStep {
			session_id,
			stage,
			duration_ms,
			cost,
			recorded_at: OffsetDateTime::now_utc(),
		};

		tokio::spawn(async move {
			match tokio::time::timeout(timeout, tracker.record_step(step)).await {
				Ok(Ok(())) => {},
				Ok(Err(err)) => {
					tracing::warn!(
						error = %err,
						session_id = %session_id,
						stage = stage.as_str(),
						"Step tracking failed."
					);
				},
				Err(_) => {
					tracing::warn!(
						session_id = %session_id,
						stage = stage.as_str(),
						"Step tracking timed out."
					);
				},
			}
		});
	}
}

/// Rejects requests that must not reach any backend.
pub fn validate_request(cfg: &Config, req: &SearchRequest) -> Result<()> {
	let query = req.query.trim();

	if query.is_empty() {
		return Err(Error::InvalidRequest { message: "query must not be empty.".to_string() });
	}

	let max_chars = cfg.search.max_query_chars as usize;

	if query.chars().count() > max_chars {
		return Err(Error::InvalidRequest {
			message: format!("query must be at most {max_chars} characters."),
		});
	}

	for (name, value) in
		[("minVectorScore", req.min_vector_score), ("minRerankScore", req.min_rerank_score)]
	{
		if let Some(value) = value
			&& !(value.is_finite() && (0.0..=1.0).contains(&value))
		{
			return Err(Error::InvalidRequest {
				message: format!("{name} must be a number in the range 0.0-1.0."),
			});
		}
	}

	if req.limit == Some(0) {
		return Err(Error::InvalidRequest {
			message: "limit must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn result_limit(cfg: &Config, req: &SearchRequest) -> usize {
	let max = cfg.search.max_results;

	req.limit.map_or(max, |limit| limit.min(max)) as usize
}

fn build_results(candidates: Vec<Candidate>, limit: usize, tags: &[String]) -> Vec<ScoredResult> {
	candidates
		.into_iter()
		.take(limit)
		.map(|candidate| {
			let matched_fields = ranking::matched_fields(&candidate.contact, tags);

			ScoredResult {
				search_metadata: ResultMetadata {
					rerank_score: candidate.rerank_score,
					hybrid_score: candidate.hybrid_score,
					vector_score: candidate.vector_score,
					matched_fields,
				},
				contact: candidate.contact,
			}
		})
		.collect()
}

fn elapsed_ms(started: Instant) -> u64 {
	started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
	use super::*;

	fn test_config() -> Config {
		let raw = r#"
[service]
http_bind = "127.0.0.1:8080"
log_level = "info"

[storage.postgres]
dsn = "postgres://localhost/rolo"
pool_max_conns = 4

[storage.qdrant]
url = "http://127.0.0.1:6334"
collection = "contacts"
vector_dim = 4

[providers.embedding]
provider_id = "local"
api_base = "http://127.0.0.1:5555"
path = "/embed"
model = "e5"
dimensions = 4
timeout_ms = 1000

[providers.rerank]
provider_id = "local"
api_base = "http://127.0.0.1:5556"
path = "/rerank"
model = "bge"
timeout_ms = 1000

[providers.llm_enhancer]
provider_id = "openai"
api_base = "http://127.0.0.1:5557"
path = "/v1/chat/completions"
model = "gpt-4o-mini"
temperature = 0.1
timeout_ms = 1000

[search]
max_query_chars = 20
max_results = 5

[search.cache]
enabled = true
ttl_hours = 24

[security]
bind_localhost_only = true
"#;

		toml::from_str(raw).expect("Test config must parse.")
	}

	fn request(query: &str) -> SearchRequest {
		SearchRequest::new(query)
	}

	#[test]
	fn rejects_blank_and_oversized_queries() {
		let cfg = test_config();

		assert!(matches!(
			validate_request(&cfg, &request("   ")),
			Err(Error::InvalidRequest { .. })
		));
		assert!(matches!(
			validate_request(&cfg, &request("a very long query that exceeds the cap")),
			Err(Error::InvalidRequest { .. })
		));
		assert!(validate_request(&cfg, &request("  🚀  ")).is_ok());
	}

	#[test]
	fn rejects_thresholds_outside_unit_range() {
		let cfg = test_config();

		for bad in [-0.1, 1.01, f32::NAN, f32::INFINITY] {
			let req = SearchRequest { min_vector_score: Some(bad), ..request("cto") };

			assert!(validate_request(&cfg, &req).is_err());

			let req = SearchRequest { min_rerank_score: Some(bad), ..request("cto") };

			assert!(validate_request(&cfg, &req).is_err());
		}

		let req = SearchRequest {
			min_vector_score: Some(0.0),
			min_rerank_score: Some(1.0),
			..request("cto")
		};

		assert!(validate_request(&cfg, &req).is_ok());
	}

	#[test]
	fn limit_is_capped_by_max_results() {
		let cfg = test_config();

		assert_eq!(result_limit(&cfg, &request("cto")), 5);
		assert_eq!(result_limit(&cfg, &SearchRequest { limit: Some(2), ..request("cto") }), 2);
		assert_eq!(result_limit(&cfg, &SearchRequest { limit: Some(50), ..request("cto") }), 5);
		assert!(
			validate_request(&cfg, &SearchRequest { limit: Some(0), ..request("cto") }).is_err()
		);
	}

	#[test]
	fn request_uses_camel_case_and_defaults() {
		let req: SearchRequest = serde_json::from_value(serde_json::json!({
			"query": "find CEO",
			"minVectorScore": 0.4,
			"includeRerank": false,
		}))
		.expect("Request must decode.");

		assert_eq!(req.min_vector_score, Some(0.4));
		assert_eq!(req.include_rerank, Some(false));
		assert!(!req.track_steps);
		assert!(req.limit.is_none());
	}

	#[test]
	fn cache_type_wire_names() {
		let encoded = serde_json::to_value([
			CacheType::Static,
			CacheType::Distributed,
			CacheType::Ai,
			CacheType::Fallback,
		])
		.expect("Cache types must encode.");

		assert_eq!(encoded, serde_json::json!(["static", "redis", "ai", "fallback"]));

		for cache_type in [CacheType::Static, CacheType::Distributed, CacheType::Ai] {
			assert_eq!(serde_json::json!(cache_type.as_str()), serde_json::json!(cache_type));
		}
	}
}
