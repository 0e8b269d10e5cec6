use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use rolo_config::Config;
use rolo_service::{
	CacheType, Error, QueryCacheStore, ScoringMethod, SearchRequest, SearchResponse, SearchStage,
};
use rolo_testkit::fakes::{FakeStack, ScriptedEnhancer, ScriptedRerank};

const OWNER: u128 = 0xA;
const OTHER_OWNER: u128 = 0xB;

fn owner() -> Uuid {
	Uuid::from_u128(OWNER)
}

fn config() -> Config {
	rolo_testkit::test_config().expect("Test config must be valid.")
}

/// Three contacts for the caller plus one belonging to someone else. The foreign contact has the
/// best vector score so owner scoping is visible.
fn stack() -> FakeStack {
	let mut ada = rolo_testkit::contact(owner(), 1, "Ada Lovelace");

	ada.job_title = Some("Chief Executive Officer".to_string());
	ada.company = Some("Acme".to_string());

	let mut grace = rolo_testkit::contact(owner(), 2, "Grace Hopper");

	grace.job_title = Some("Software Engineer".to_string());
	grace.company = Some("Navy Labs".to_string());
	grace.tags = vec!["developer".to_string()];

	let mut linus = rolo_testkit::contact(owner(), 3, "Linus Pauling");

	linus.job_title = Some("Chemist".to_string());
	linus.company = Some("Caltech".to_string());

	let mallory = rolo_testkit::contact(Uuid::from_u128(OTHER_OWNER), 4, "Mallory");

	FakeStack::new(vec![ada, grace, linus, mallory], &[(4, 0.95), (1, 0.9), (2, 0.8), (3, 0.4)])
		.with_rerank(ScriptedRerank::new(&[("Grace", 4.0), ("Ada", -4.0)], 0.0))
}

fn ids(response: &SearchResponse) -> Vec<u128> {
	response.results.iter().map(|result| result.contact.id.as_u128()).collect()
}

fn degraded_stages(response: &SearchResponse) -> Vec<SearchStage> {
	response.search_metadata.degraded.iter().map(|entry| entry.stage).collect()
}

#[tokio::test]
async fn static_hit_skips_the_enhancer_and_shared_tier() {
	let fakes = stack();
	let service = fakes.service(config());

	for query in ["CEO", "ceo", "CeO", "Senior CEO"] {
		let response =
			service.search(owner(), SearchRequest::new(query)).await.expect("Search must succeed.");
		let metadata = &response.search_metadata;

		assert_eq!(metadata.enhancement.cache_type, CacheType::Static);
		assert!(metadata.enhancement.cached);
		assert_eq!(metadata.costs.enhancement, 0.0);
		assert!(metadata.enhanced_query.contains("chief executive officer"));
		assert!(metadata.enhancement.duration_ms < 10);
	}

	assert_eq!(fakes.enhancer.calls(), 0);
	assert_eq!(fakes.cache.calls(), 0);
}

#[tokio::test]
async fn live_enhancement_is_served_from_the_shared_tier_on_repeat() {
	let fakes = stack();
	let service = fakes.service(config());
	let first = service
		.search(owner(), SearchRequest::new("quantum researchers"))
		.await
		.expect("First search must succeed.");

	assert_eq!(first.search_metadata.enhancement.cache_type, CacheType::Ai);
	assert!(!first.search_metadata.enhancement.cached);
	assert!(first.search_metadata.enhancement.tokens_used.is_some());
	// 1000 input tokens at 1.0 plus 500 output tokens at 2.0 per thousand.
	assert!((first.search_metadata.costs.enhancement - 2.0).abs() < 1e-9);
	assert_eq!(first.search_metadata.enhanced_query, "enhanced query");
	assert_eq!(fakes.cache.puts(), 1);

	let second = service
		.search(owner(), SearchRequest::new("  Quantum   researchers "))
		.await
		.expect("Second search must succeed.");

	assert_eq!(second.search_metadata.enhancement.cache_type, CacheType::Distributed);
	assert!(second.search_metadata.enhancement.cached);
	assert!(second.search_metadata.enhancement.tokens_used.is_none());
	assert_eq!(second.search_metadata.costs.enhancement, 0.0);
	assert_eq!(second.search_metadata.enhanced_query, first.search_metadata.enhanced_query);
	assert_ne!(
		second.search_metadata.enhancement.enhance_id,
		first.search_metadata.enhancement.enhance_id
	);
	assert_eq!(fakes.enhancer.calls(), 1);
}

#[tokio::test]
async fn warm_cache_gives_deterministic_rankings() {
	let fakes = stack();
	let service = fakes.service(config());
	let first = service
		.search(owner(), SearchRequest::new("quantum researchers"))
		.await
		.expect("First search must succeed.");
	let second = service
		.search(owner(), SearchRequest::new("quantum researchers"))
		.await
		.expect("Second search must succeed.");

	assert_eq!(first.search_metadata.enhanced_query, second.search_metadata.enhanced_query);
	assert_eq!(ids(&first), ids(&second));
}

#[tokio::test]
async fn enhancer_failure_falls_back_to_the_original_query() {
	let fakes = stack();

	fakes.enhancer.set_failing(true);

	let service = fakes.service(config());
	let response = service
		.search(owner(), SearchRequest::new("quantum researchers"))
		.await
		.expect("A degraded search must still succeed.");
	let metadata = &response.search_metadata;

	assert_eq!(metadata.enhancement.cache_type, CacheType::Fallback);
	assert_eq!(metadata.enhanced_query, "quantum researchers");
	assert_eq!(metadata.costs.enhancement, 0.0);
	assert_eq!(degraded_stages(&response), vec![SearchStage::Enhancing]);
	assert_eq!(fakes.cache.puts(), 0);
	assert!(!response.results.is_empty());
}

#[tokio::test]
async fn malformed_enhancer_reply_falls_back() {
	let fakes = stack();

	fakes.enhancer.set_reply("{\"queries\": []}");

	let response = fakes
		.service(config())
		.search(owner(), SearchRequest::new("quantum researchers"))
		.await
		.expect("A degraded search must still succeed.");

	assert_eq!(response.search_metadata.enhancement.cache_type, CacheType::Fallback);
	assert_eq!(fakes.cache.puts(), 0);
}

#[tokio::test]
async fn disabled_enhancement_reports_the_disabled_reason() {
	let fakes = stack();
	let mut cfg = config();

	cfg.search.enhancement.enabled = false;

	let response = fakes
		.service(cfg)
		.search(owner(), SearchRequest::new("quantum researchers"))
		.await
		.expect("Search must succeed.");

	assert_eq!(response.search_metadata.enhancement.cache_type, CacheType::Fallback);
	assert_eq!(response.search_metadata.degraded[0].reason, "disabled");
	assert_eq!(fakes.enhancer.calls(), 0);
}

#[tokio::test]
async fn shared_tier_failures_count_as_misses() {
	let fakes = stack();

	fakes.cache.set_failing(true);
	fakes.cache.set_failing_writes(true);

	let response = fakes
		.service(config())
		.search(owner(), SearchRequest::new("quantum researchers"))
		.await
		.expect("Cache failures must not fail the search.");

	assert_eq!(response.search_metadata.enhancement.cache_type, CacheType::Ai);
	assert!(response.search_metadata.degraded.is_empty());
	assert!(fakes.cache.is_empty());
}

#[tokio::test]
async fn invalid_requests_make_no_external_calls() {
	let fakes = stack();
	let service = fakes.service(config());
	let too_long = "x".repeat(2_001);
	let requests = [
		SearchRequest::new(""),
		SearchRequest::new("   "),
		SearchRequest::new(too_long),
		SearchRequest { min_vector_score: Some(1.5), ..SearchRequest::new("cto") },
		SearchRequest { min_rerank_score: Some(-0.1), ..SearchRequest::new("cto") },
		SearchRequest { limit: Some(0), ..SearchRequest::new("cto") },
	];

	for req in requests {
		let result = service.search(owner(), req).await;

		assert!(matches!(result, Err(Error::InvalidRequest { .. })));
	}

	assert_eq!(fakes.external_calls(), 0);
}

#[tokio::test]
async fn find_engineer_strips_the_command_and_fuses_scores() {
	let fakes = stack();
	let response = fakes
		.service(config())
		.search(owner(), SearchRequest::new("find engineer"))
		.await
		.expect("Search must succeed.");
	let metadata = &response.search_metadata;

	assert_eq!(metadata.enhancement.cache_type, CacheType::Static);

	for term in ["software", "developer", "technical"] {
		assert!(metadata.enhanced_query.contains(term), "missing {term}");
	}

	assert_eq!(fakes.rerank.queries(), vec!["engineer".to_string()]);
	assert_eq!(metadata.query_tags, vec!["engineer".to_string()]);
	assert_eq!(fakes.embedding.texts(), vec![metadata.enhanced_query.clone()]);
	assert_eq!(ids(&response), vec![2, 3, 1]);

	for result in &response.results {
		let scores = &result.search_metadata;
		let rerank = scores.rerank_score.expect("Reranked results carry a rerank score.");
		let hybrid = scores.hybrid_score.expect("Reranked results carry a hybrid score.");

		assert!((hybrid - (0.3 * scores.vector_score + 0.7 * rerank)).abs() < 1e-6);
		assert!((0.0..=1.0).contains(&rerank));
	}

	assert_eq!(response.results[0].search_metadata.matched_fields, vec!["Job Title"]);

	let rerank = metadata.rerank.as_ref().expect("Rerank metadata must be present.");

	assert_eq!(rerank.scoring_method, ScoringMethod::Rerank);
	assert_eq!(rerank.documents_reranked, 3);
	// Three documents at 2.0 per thousand.
	assert!((metadata.costs.rerank - 0.006).abs() < 1e-9);
	assert!(
		(metadata.costs.total - metadata.costs.enhancement - metadata.costs.rerank).abs() < 1e-12
	);
}

#[tokio::test]
async fn rerank_documents_use_labelled_lines() {
	let fakes = stack();

	fakes
		.service(config())
		.search(owner(), SearchRequest::new("find engineer"))
		.await
		.expect("Search must succeed.");

	let documents = fakes.rerank.documents();

	assert!(documents.contains(
		&"Name: Grace Hopper\nJob Title: Software Engineer\nCompany: Navy Labs\nTags: developer"
			.to_string()
	));
	assert!(documents.iter().all(|doc| !doc.contains("Mallory")));
}

#[tokio::test]
async fn hydration_scopes_to_the_owner_and_skips_deleted_contacts() {
	let fakes = stack();

	fakes.contacts.delete(3);

	let response = fakes
		.service(config())
		.search(owner(), SearchRequest::new("cto"))
		.await
		.expect("Search must succeed.");

	assert_eq!(fakes.index.owners(), vec![owner()]);
	assert!(!ids(&response).contains(&4));
	assert!(!ids(&response).contains(&3));
}

#[tokio::test]
async fn vector_threshold_filters_and_reports() {
	let fakes = stack();
	let req = SearchRequest { min_vector_score: Some(0.5), ..SearchRequest::new("cto") };
	let response =
		fakes.service(config()).search(owner(), req).await.expect("Search must succeed.");
	let stats = response
		.search_metadata
		.threshold_filtering
		.expect("Threshold stats must be reported.");

	assert_eq!(stats.raw_count, 4);
	assert_eq!(stats.filtered_count, 3);
	assert_eq!(stats.removed_count, stats.raw_count - stats.filtered_count);
	assert!(response.results.iter().all(|result| result.search_metadata.vector_score >= 0.5));
}

#[tokio::test]
async fn no_vector_threshold_reports_no_stats() {
	let fakes = stack();
	let response = fakes
		.service(config())
		.search(owner(), SearchRequest::new("cto"))
		.await
		.expect("Search must succeed.");

	assert!(response.search_metadata.threshold_filtering.is_none());
	assert_eq!(response.results.len(), 3);
}

#[tokio::test]
async fn extreme_rerank_threshold_falls_back_to_vector_order() {
	let fakes = stack();
	let req = SearchRequest { min_rerank_score: Some(0.99), ..SearchRequest::new("cto") };
	let response =
		fakes.service(config()).search(owner(), req).await.expect("Search must succeed.");
	let rerank = response.search_metadata.rerank.as_ref().expect("Rerank metadata must exist.");
	let stats = rerank.filtering_stats.expect("Filtering stats must be reported.");

	assert_eq!(rerank.scoring_method, ScoringMethod::Vector);
	assert!(stats.fallback_applied);
	assert_eq!((stats.raw_count, stats.filtered_count, stats.removed_count), (3, 0, 3));
	assert_eq!(ids(&response), vec![1, 2, 3]);
	assert!(response.results.iter().all(|result| {
		result.search_metadata.hybrid_score.is_none()
			&& result.search_metadata.rerank_score.is_some()
	}));
}

#[tokio::test]
async fn rerank_failure_is_critical_by_default() {
	let fakes = stack();

	fakes.rerank.set_failing(true);

	let result = fakes.service(config()).search(owner(), SearchRequest::new("cto")).await;

	match result {
		Err(Error::CriticalStage { stage: SearchStage::Reranking, message }) => {
			assert!(message.contains("3 candidates"));
			assert!(message.contains("local"));
		},
		other => panic!("Expected a critical rerank failure, got {other:?}."),
	}
}

#[tokio::test]
async fn rerank_score_count_mismatch_is_critical() {
	let fakes = stack();

	fakes.rerank.set_drop_last(true);

	let result = fakes.service(config()).search(owner(), SearchRequest::new("cto")).await;

	assert!(matches!(
		result,
		Err(Error::CriticalStage { stage: SearchStage::Reranking, .. })
	));
}

#[tokio::test]
async fn rerank_failure_degrades_when_fallback_is_enabled() {
	let fakes = stack();
	let mut cfg = config();

	cfg.search.rerank.fallback_on_error = true;
	fakes.rerank.set_failing(true);

	let response = fakes
		.service(cfg)
		.search(owner(), SearchRequest::new("cto"))
		.await
		.expect("Search must degrade instead of failing.");

	assert_eq!(degraded_stages(&response), vec![SearchStage::Reranking]);
	assert_eq!(
		response.search_metadata.rerank.as_ref().map(|rerank| rerank.scoring_method),
		Some(ScoringMethod::Vector)
	);
	assert_eq!(ids(&response), vec![1, 2, 3]);
}

#[tokio::test]
async fn embedding_failures_abort_the_search() {
	let fakes = stack();

	fakes.embedding.set_failing(true);

	let result = fakes.service(config()).search(owner(), SearchRequest::new("cto")).await;

	assert!(matches!(result, Err(Error::CriticalStage { stage: SearchStage::Embedding, .. })));
	assert_eq!(fakes.index.calls(), 0);

	fakes.embedding.set_failing(false);
	fakes.embedding.set_dim(3);

	let result = fakes.service(config()).search(owner(), SearchRequest::new("cto")).await;

	assert!(matches!(result, Err(Error::CriticalStage { stage: SearchStage::Embedding, .. })));
}

#[tokio::test]
async fn vector_index_failures_abort_the_search() {
	let fakes = stack();

	fakes.index.set_failing(true);

	let result = fakes.service(config()).search(owner(), SearchRequest::new("cto")).await;

	assert!(matches!(
		result,
		Err(Error::CriticalStage { stage: SearchStage::VectorSearching, .. })
	));
	assert_eq!(fakes.contacts.calls(), 0);
}

#[tokio::test]
async fn stalled_vector_index_times_out() {
	let fakes = stack();

	fakes.index.set_stalled(true);

	let result = fakes.service(config()).search(owner(), SearchRequest::new("cto")).await;

	match result {
		Err(Error::CriticalStage { stage: SearchStage::VectorSearching, message }) =>
			assert!(message.contains("timed out")),
		other => panic!("Expected a vector search timeout, got {other:?}."),
	}
}

#[tokio::test]
async fn hydration_failure_degrades_to_empty_results() {
	let fakes = stack();

	fakes.contacts.set_failing(true);

	let response = fakes
		.service(config())
		.search(owner(), SearchRequest::new("cto"))
		.await
		.expect("A degraded search must still succeed.");

	assert!(response.results.is_empty());
	assert_eq!(degraded_stages(&response), vec![SearchStage::Hydrating]);
	assert_eq!(fakes.rerank.calls(), 0);
	assert_eq!(
		response.search_metadata.rerank.as_ref().map(|rerank| rerank.documents_reranked),
		Some(0)
	);
}

#[tokio::test]
async fn skipping_rerank_ranks_by_vector_score() {
	let fakes = stack();
	let req = SearchRequest { include_rerank: Some(false), ..SearchRequest::new("cto") };
	let response =
		fakes.service(config()).search(owner(), req).await.expect("Search must succeed.");

	assert_eq!(fakes.rerank.calls(), 0);
	assert!(response.search_metadata.rerank.is_none());
	assert_eq!(ids(&response), vec![1, 2, 3]);
	assert!(response.results.iter().all(|result| result.search_metadata.hybrid_score.is_none()));
}

#[tokio::test]
async fn limit_truncates_results() {
	let fakes = stack();
	let req = SearchRequest { limit: Some(1), ..SearchRequest::new("find engineer") };
	let response =
		fakes.service(config()).search(owner(), req).await.expect("Search must succeed.");

	assert_eq!(ids(&response), vec![2]);
}

#[tokio::test]
async fn session_is_recorded_once_per_search() {
	let fakes = stack();
	let response = fakes
		.service(config())
		.search(owner(), SearchRequest::new("cto"))
		.await
		.expect("Search must succeed.");
	let sessions = fakes.tracker.sessions();

	assert_eq!(sessions.len(), 1);
	assert_eq!(sessions[0].session_id, response.search_metadata.session_id);
	assert_eq!(sessions[0].owner_id, owner());
	assert_eq!(sessions[0].cache_type, CacheType::Static);
	assert_eq!(sessions[0].result_count, response.results.len());
	assert!(fakes.tracker.steps().is_empty());
}

#[tokio::test]
async fn session_failure_is_only_a_degradation() {
	let fakes = stack();

	fakes.tracker.set_failing(true);

	let response = fakes
		.service(config())
		.search(owner(), SearchRequest::new("cto"))
		.await
		.expect("Session failures must not fail the search.");

	assert_eq!(degraded_stages(&response), vec![SearchStage::Finalizing]);
	assert_eq!(response.results.len(), 3);
}

#[tokio::test]
async fn track_steps_records_every_stage_in_the_background() {
	let fakes = stack();
	let req = SearchRequest { track_steps: true, ..SearchRequest::new("cto") };
	let response =
		fakes.service(config()).search(owner(), req).await.expect("Search must succeed.");

	for _ in 0..50 {
		if fakes.tracker.steps().len() >= 5 {
			break;
		}

		tokio::time::sleep(Duration::from_millis(10)).await;
	}

	let steps = fakes.tracker.steps();
	let mut stages: Vec<SearchStage> = steps.iter().map(|step| step.stage).collect();

	stages.sort_by_key(|stage| stage.as_str());

	assert_eq!(
		stages,
		vec![
			SearchStage::Embedding,
			SearchStage::Enhancing,
			SearchStage::Hydrating,
			SearchStage::Reranking,
			SearchStage::VectorSearching,
		]
	);
	assert!(steps.iter().all(|step| step.session_id == response.search_metadata.session_id));
}

#[tokio::test]
async fn cancellation_aborts_at_the_pending_stage() {
	let fakes = stack();

	fakes.embedding.set_stalled(true);

	let service = fakes.service(config());
	let token = CancellationToken::new();
	let trigger = token.clone();

	tokio::spawn(async move {
		tokio::time::sleep(Duration::from_millis(20)).await;
		trigger.cancel();
	});

	let result = service.search_with_cancel(owner(), SearchRequest::new("cto"), &token).await;

	assert!(matches!(result, Err(Error::Cancelled { stage: SearchStage::Embedding })));
	assert_eq!(fakes.index.calls(), 0);
}

#[tokio::test]
async fn cancelled_token_stops_during_enhancement() {
	let fakes = stack();
	let token = CancellationToken::new();

	token.cancel();

	let result = fakes
		.service(config())
		.search_with_cancel(owner(), SearchRequest::new("quantum researchers"), &token)
		.await;

	assert!(matches!(result, Err(Error::Cancelled { stage: SearchStage::Enhancing })));
	assert_eq!(fakes.enhancer.calls(), 0);
}

#[tokio::test]
async fn symbol_only_queries_get_their_own_shared_entries() {
	let fakes = stack();
	let service = fakes.service(config());

	fakes.enhancer.set_reply(r#"{"enhanced_query": "rocket space startup launch"}"#);

	let rocket = service
		.search(owner(), SearchRequest::new("🚀"))
		.await
		.expect("Rocket search must succeed.");

	assert_eq!(rocket.search_metadata.enhancement.cache_type, CacheType::Ai);
	assert_eq!(rocket.search_metadata.enhanced_query, "rocket space startup launch");

	fakes.enhancer.set_reply(r#"{"enhanced_query": "briefcase business executive"}"#);

	let briefcase = service
		.search(owner(), SearchRequest::new("💼"))
		.await
		.expect("Briefcase search must succeed.");

	assert_eq!(briefcase.search_metadata.enhancement.cache_type, CacheType::Ai);
	assert_eq!(briefcase.search_metadata.enhanced_query, "briefcase business executive");
	assert_eq!(fakes.enhancer.calls(), 2);
	assert_eq!(fakes.cache.len(), 2);
}

#[tokio::test]
async fn punctuation_and_control_queries_never_share_a_key() {
	let fakes = stack().with_enhancer(ScriptedEnhancer::echo());
	let service = fakes.service(config());
	let queries = ["🚀🔥", "🚀", "💼", "¿?", "$$$", "\0", "?!", "!?"];

	for query in queries {
		let response = service
			.search(owner(), SearchRequest::new(query))
			.await
			.expect("Search must succeed.");

		assert_eq!(response.search_metadata.enhancement.cache_type, CacheType::Ai, "{query:?}");
		assert_eq!(response.search_metadata.enhanced_query, format!("expanded {query}"));
	}

	assert_eq!(fakes.cache.len(), queries.len());

	let repeat =
		service.search(owner(), SearchRequest::new("🚀")).await.expect("Repeat must succeed.");

	assert_eq!(repeat.search_metadata.enhancement.cache_type, CacheType::Distributed);
	assert_eq!(repeat.search_metadata.enhanced_query, "expanded 🚀");
}

#[tokio::test]
async fn unusual_but_valid_queries_run_end_to_end() {
	let fakes = stack().with_enhancer(ScriptedEnhancer::echo());
	let cfg = config();
	let max_chars = cfg.search.max_query_chars as usize;
	let max_enhanced = cfg.search.enhancement.max_enhanced_chars as usize;
	let service = fakes.service(cfg);
	let longest = "q".repeat(max_chars);
	let queries = [
		"a",
		"42",
		"🚀",
		"<script>alert('x')</script>",
		"../../etc/passwd",
		"Robert'); DROP TABLE contacts;--",
		longest.as_str(),
	];

	for query in queries {
		let response = service
			.search(owner(), SearchRequest::new(query))
			.await
			.unwrap_or_else(|err| panic!("Search for {query:?} must succeed: {err}"));
		let metadata = &response.search_metadata;
		let expected: String = format!("expanded {query}").chars().take(max_enhanced).collect();

		assert_eq!(metadata.query, query);
		assert_eq!(metadata.enhancement.cache_type, CacheType::Ai, "{query:?}");
		assert_eq!(metadata.enhanced_query, expected);
		assert!(metadata.degraded.is_empty(), "{query:?} degraded: {:?}", metadata.degraded);
		assert_eq!(ids(&response), vec![2, 3, 1]);
	}

	let too_long = "q".repeat(max_chars + 1);

	assert!(matches!(
		service.search(owner(), SearchRequest::new(&too_long)).await,
		Err(Error::InvalidRequest { .. })
	));
}

#[tokio::test]
async fn purge_removes_only_expired_cache_entries() {
	let fakes = stack();
	let service = fakes.service(config());

	fakes
		.cache
		.put("stale", serde_json::json!({}), time::Duration::hours(-1))
		.await
		.expect("Failed to seed stale entry.");
	fakes
		.cache
		.put("fresh", serde_json::json!({}), time::Duration::hours(1))
		.await
		.expect("Failed to seed fresh entry.");

	assert_eq!(service.purge_expired_cache().await.expect("Purge must succeed."), 1);
	assert_eq!(fakes.cache.len(), 1);
	assert_eq!(service.purge_expired_cache().await.expect("Purge must succeed."), 0);
}

#[tokio::test]
async fn purge_loop_sweeps_at_start_and_stops_on_cancel() {
	let fakes = stack();
	let service = Arc::new(fakes.service(config()));

	fakes
		.cache
		.put("stale", serde_json::json!({}), time::Duration::hours(-1))
		.await
		.expect("Failed to seed stale entry.");

	let token = CancellationToken::new();
	let handle = tokio::spawn({
		let service = service.clone();
		let token = token.clone();

		async move { service.run_cache_purge(&token).await }
	});

	for _ in 0..100 {
		if fakes.cache.is_empty() {
			break;
		}

		tokio::time::sleep(Duration::from_millis(10)).await;
	}

	assert!(fakes.cache.is_empty());

	token.cancel();

	tokio::time::timeout(Duration::from_secs(1), handle)
		.await
		.expect("Purge loop must stop after cancellation.")
		.expect("Purge loop must not panic.");
}

#[tokio::test]
async fn purge_loop_survives_store_failures() {
	let fakes = stack();
	let service = Arc::new(fakes.service(config()));

	fakes.cache.set_failing(true);

	assert!(service.purge_expired_cache().await.is_err());

	let token = CancellationToken::new();
	let handle = tokio::spawn({
		let service = service.clone();
		let token = token.clone();

		async move { service.run_cache_purge(&token).await }
	});

	for _ in 0..100 {
		if fakes.cache.calls() >= 2 {
			break;
		}

		tokio::time::sleep(Duration::from_millis(10)).await;
	}

	assert!(fakes.cache.calls() >= 2);
	assert!(!handle.is_finished());

	token.cancel();

	tokio::time::timeout(Duration::from_secs(1), handle)
		.await
		.expect("Purge loop must stop after cancellation.")
		.expect("Purge loop must not panic.");
}
