mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, EmbeddingProviderConfig, LlmProviderConfig, Postgres, Providers, Qdrant, Ranking,
	RerankProviderConfig, Search, SearchCache, SearchEnhancement, SearchRerank, SearchSessions,
	SearchTimeouts, Security, Service, Storage,
};

use std::{fs, path::Path};

pub const SCORE_NORMALIZATIONS: [&str; 3] = ["sigmoid", "clamp", "none"];

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}
	if cfg.storage.qdrant.collection.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.qdrant.collection must be non-empty.".to_string(),
		});
	}
	if cfg.search.max_query_chars == 0 {
		return Err(Error::Validation {
			message: "search.max_query_chars must be greater than zero.".to_string(),
		});
	}
	if cfg.search.vector_top_k == 0 {
		return Err(Error::Validation {
			message: "search.vector_top_k must be greater than zero.".to_string(),
		});
	}
	if cfg.search.max_results == 0 {
		return Err(Error::Validation {
			message: "search.max_results must be greater than zero.".to_string(),
		});
	}
	if cfg.search.cache.ttl_hours <= 0 {
		return Err(Error::Validation {
			message: "search.cache.ttl_hours must be greater than zero.".to_string(),
		});
	}

	if cfg.search.cache.purge_interval_secs == 0 {
		return Err(Error::Validation {
			message: "search.cache.purge_interval_secs must be greater than zero.".to_string(),
		});
	}

	if let Some(max) = cfg.search.cache.max_payload_bytes
		&& max == 0
	{
		return Err(Error::Validation {
			message: "search.cache.max_payload_bytes must be greater than zero.".to_string(),
		});
	}

	if cfg.search.enhancement.max_enhanced_chars == 0 {
		return Err(Error::Validation {
			message: "search.enhancement.max_enhanced_chars must be greater than zero."
				.to_string(),
		});
	}
	if !SCORE_NORMALIZATIONS.contains(&cfg.search.rerank.score_normalization.as_str()) {
		return Err(Error::Validation {
			message: "search.rerank.score_normalization must be one of sigmoid, clamp, or none."
				.to_string(),
		});
	}

	let timeouts = &cfg.search.timeouts;

	for (label, value) in [
		("cache_ms", timeouts.cache_ms),
		("enhance_ms", timeouts.enhance_ms),
		("embed_ms", timeouts.embed_ms),
		("vector_ms", timeouts.vector_ms),
		("hydrate_ms", timeouts.hydrate_ms),
		("rerank_ms", timeouts.rerank_ms),
		("tracking_ms", timeouts.tracking_ms),
	] {
		if value == 0 {
			return Err(Error::Validation {
				message: format!("search.timeouts.{label} must be greater than zero."),
			});
		}
	}

	for (label, weight) in [
		("ranking.vector_weight", cfg.ranking.vector_weight),
		("ranking.rerank_weight", cfg.ranking.rerank_weight),
	] {
		if !weight.is_finite() {
			return Err(Error::Validation { message: format!("{label} must be a finite number.") });
		}
		if !(0.0..=1.0).contains(&weight) {
			return Err(Error::Validation {
				message: format!("{label} must be in the range 0.0-1.0."),
			});
		}
	}

	if (cfg.ranking.vector_weight + cfg.ranking.rerank_weight - 1.0).abs() > 1e-6 {
		return Err(Error::Validation {
			message: "ranking.vector_weight and ranking.rerank_weight must sum to 1.0.".to_string(),
		});
	}

	let llm = &cfg.providers.llm_enhancer;

	for (label, cost) in [
		("providers.llm_enhancer.input_cost_per_1k_tokens", llm.input_cost_per_1k_tokens),
		("providers.llm_enhancer.output_cost_per_1k_tokens", llm.output_cost_per_1k_tokens),
		("providers.rerank.cost_per_1k_documents", cfg.providers.rerank.cost_per_1k_documents),
	] {
		if !cost.is_finite() || cost < 0.0 {
			return Err(Error::Validation {
				message: format!("{label} must be a finite number, zero or greater."),
			});
		}
	}

	for (label, timeout_ms) in [
		("embedding", cfg.providers.embedding.timeout_ms),
		("rerank", cfg.providers.rerank.timeout_ms),
		("llm_enhancer", cfg.providers.llm_enhancer.timeout_ms),
	] {
		if timeout_ms == 0 {
			return Err(Error::Validation {
				message: format!("Provider {label} timeout_ms must be greater than zero."),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg
		.providers
		.embedding
		.query_prefix
		.as_deref()
		.map(|prefix| prefix.is_empty())
		.unwrap_or(false)
	{
		cfg.providers.embedding.query_prefix = None;
	}

	cfg.search.rerank.score_normalization =
		cfg.search.rerank.score_normalization.trim().to_ascii_lowercase();
}
