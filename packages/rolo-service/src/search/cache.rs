use std::time::{Duration, Instant};

use serde_json::Value;
use time::OffsetDateTime;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use rolo_config::Config;
use rolo_domain::{query_text, static_expansions};

use crate::{
	Error, QueryCacheStore, Result, RoloService,
	backends::ENHANCEMENT_CACHE_KIND,
	guard,
	search::{CacheType, EnhancedQuery, EnhancementMetadata},
	stage::SearchStage,
};

const CACHE_SCHEMA_VERSION: i32 = 1;

/// Static table first, then the shared store. Live enhancement is the caller's job.
pub struct TieredQueryCache<'a> {
	cfg: &'a Config,
	store: &'a dyn QueryCacheStore,
}
impl<'a> TieredQueryCache<'a> {
	pub fn new(cfg: &'a Config, store: &'a dyn QueryCacheStore) -> Self {
		Self { cfg, store }
	}

	pub fn lookup_static(&self, query: &str) -> Option<EnhancedQuery> {
		if !self.cfg.search.cache.static_enabled {
			return None;
		}

		let started = Instant::now();
		let hit = static_expansions::lookup(query)?;

		tracing::info!(
			cache_kind = "static",
			key = hit.entry.key,
			exact = hit.exact,
			hit = true,
			"Cache hit."
		);

		Some(EnhancedQuery {
			original_query: query.to_string(),
			enhanced_query: static_expansions::expand(query, hit.entry),
			language: hit.entry.language,
			metadata: EnhancementMetadata {
				cache_type: CacheType::Static,
				cached: true,
				cost: 0.0,
				duration_ms: started.elapsed().as_millis() as u64,
				tokens_used: None,
				enhance_id: Uuid::new_v4(),
			},
		})
	}

	/// Key of `query` in the shared tier, or `None` when the tier is disabled.
	pub fn shared_key(&self, query: &str) -> Option<String> {
		if !self.cfg.search.cache.enabled {
			return None;
		}

		let llm = &self.cfg.providers.llm_enhancer;

		match build_cache_key(&query_text::cache_key_text(query), &llm.provider_id, &llm.model) {
			Ok(key) => Some(key),
			Err(err) => {
				tracing::warn!(
					error = %err,
					cache_kind = ENHANCEMENT_CACHE_KIND,
					"Cache key build failed."
				);

				None
			},
		}
	}

	/// Reads the shared tier. Read and decode failures count as a miss; only cancellation
	/// propagates.
	pub async fn lookup_shared(
		&self,
		query: &str,
		key: &str,
		cancel: &CancellationToken,
	) -> Result<Option<EnhancedQuery>> {
		let started = Instant::now();
		let timeout_ms = self.cfg.search.timeouts.cache_ms;
		let payload =
			match guard::guarded(SearchStage::Enhancing, timeout_ms, cancel, self.store.get(key))
				.await
			{
				Ok(payload) => payload,
				Err(err) if err.is_cancelled() => return Err(err),
				Err(err) => {
					tracing::warn!(
						error = %err,
						cache_kind = ENHANCEMENT_CACHE_KIND,
						cache_key_prefix = cache_key_prefix(key),
						"Cache read failed."
					);

					return Ok(None);
				},
			};
		let Some(payload) = payload else {
			tracing::info!(
				cache_kind = ENHANCEMENT_CACHE_KIND,
				cache_key_prefix = cache_key_prefix(key),
				hit = false,
				payload_size = 0_u64,
				"Cache miss."
			);

			return Ok(None);
		};
		let payload_size = payload_size(&payload);
		let mut cached: EnhancedQuery = match serde_json::from_value(payload) {
			Ok(value) => value,
			Err(err) => {
				tracing::warn!(
					error = %err,
					cache_kind = ENHANCEMENT_CACHE_KIND,
					cache_key_prefix = cache_key_prefix(key),
					"Cache payload decode failed."
				);

				return Ok(None);
			},
		};

		tracing::info!(
			cache_kind = ENHANCEMENT_CACHE_KIND,
			cache_key_prefix = cache_key_prefix(key),
			hit = true,
			payload_size,
			"Cache hit."
		);

		cached.original_query = query.to_string();
		cached.metadata = EnhancementMetadata {
			cache_type: CacheType::Distributed,
			cached: true,
			cost: 0.0,
			duration_ms: started.elapsed().as_millis() as u64,
			tokens_used: None,
			enhance_id: Uuid::new_v4(),
		};

		Ok(Some(cached))
	}

	/// Writes a live enhancement to the shared tier. Failures are logged and dropped.
	pub async fn store_shared(&self, key: &str, value: &EnhancedQuery, cancel: &CancellationToken) {
		let cache_cfg = &self.cfg.search.cache;
		let payload = match serde_json::to_value(value) {
			Ok(payload) => payload,
			Err(err) => {
				tracing::warn!(
					error = %err,
					cache_kind = ENHANCEMENT_CACHE_KIND,
					cache_key_prefix = cache_key_prefix(key),
					"Cache payload encode failed."
				);

				return;
			},
		};
		let payload_size = payload_size(&payload);

		if let Some(max) = cache_cfg.max_payload_bytes
			&& payload_size as u64 > max
		{
			tracing::warn!(
				cache_kind = ENHANCEMENT_CACHE_KIND,
				cache_key_prefix = cache_key_prefix(key),
				hit = false,
				payload_size,
				"Cache payload skipped due to size."
			);

			return;
		}

		let ttl = time::Duration::hours(cache_cfg.ttl_hours);
		let timeout_ms = self.cfg.search.timeouts.cache_ms;

		match guard::guarded(
			SearchStage::Enhancing,
			timeout_ms,
			cancel,
			self.store.put(key, payload, ttl),
		)
		.await
		{
			Ok(()) => {
				tracing::info!(
					cache_kind = ENHANCEMENT_CACHE_KIND,
					cache_key_prefix = cache_key_prefix(key),
					hit = false,
					payload_size,
					ttl_hours = cache_cfg.ttl_hours,
					"Cache stored."
				);
			},
			Err(err) => {
				tracing::warn!(
					error = %err,
					cache_kind = ENHANCEMENT_CACHE_KIND,
					cache_key_prefix = cache_key_prefix(key),
					"Cache write failed."
				);
			},
		}
	}
}

impl RoloService {
	/// Deletes expired shared-tier entries once.
	pub async fn purge_expired_cache(&self) -> Result<u64> {
		let purged = self.stores.query_cache.purge_expired(OffsetDateTime::now_utc()).await?;

		if purged > 0 {
			tracing::info!(
				purged,
				cache_kind = ENHANCEMENT_CACHE_KIND,
				"Purged expired query cache entries."
			);
		}

		Ok(purged)
	}

	/// Sweeps expired entries every `search.cache.purge_interval_secs` until `cancel` fires.
	/// The first sweep runs immediately. A failed sweep is logged and retried on the next tick.
	pub async fn run_cache_purge(&self, cancel: &CancellationToken) {
		let period = Duration::from_secs(self.cfg.search.cache.purge_interval_secs);
		let mut ticker = tokio::time::interval(period);

		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

		loop {
			tokio::select! {
				biased;
				_ = cancel.cancelled() => return,
				_ = ticker.tick() => {},
			}

			if let Err(err) = self.purge_expired_cache().await {
				tracing::warn!(
					error = %err,
					cache_kind = ENHANCEMENT_CACHE_KIND,
					"Query cache purge failed."
				);
			}
		}
	}
}

pub fn build_cache_key(normalized_query: &str, provider_id: &str, model: &str) -> Result<String> {
	let payload = serde_json::json!({
		"kind": ENHANCEMENT_CACHE_KIND,
		"schema_version": CACHE_SCHEMA_VERSION,
		"query": normalized_query,
		"provider_id": provider_id,
		"model": model,
	});
	let raw = serde_json::to_vec(&payload).map_err(|err| Error::Storage {
		message: format!("Failed to encode cache key payload: {err}"),
	})?;

	Ok(blake3::hash(&raw).to_hex().to_string())
}

pub fn cache_key_prefix(key: &str) -> &str {
	let len = key.len().min(12);

	&key[..len]
}

fn payload_size(payload: &Value) -> usize {
	serde_json::to_vec(payload).map(|raw| raw.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cache_key_is_stable_and_model_scoped() {
		let a = build_cache_key("senior cto", "openai", "gpt-4o-mini").expect("Key must build.");
		let b = build_cache_key("senior cto", "openai", "gpt-4o-mini").expect("Key must build.");
		let c = build_cache_key("senior cto", "openai", "gpt-4o").expect("Key must build.");

		assert_eq!(a, b);
		assert_ne!(a, c);
		assert_eq!(a.len(), 64);
		assert_eq!(cache_key_prefix(&a).len(), 12);
	}
}
