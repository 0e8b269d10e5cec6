use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub search: Search,
	#[serde(default)]
	pub ranking: Ranking,
	pub security: Security,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub rerank: RerankProviderConfig,
	pub llm_enhancer: LlmProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	#[serde(default)]
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
	/// Prepended to the enhanced query before embedding, e.g. "query: " for E5 models.
	#[serde(default)]
	pub query_prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RerankProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	#[serde(default)]
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
	#[serde(default)]
	pub cost_per_1k_documents: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	#[serde(default)]
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	#[serde(default = "default_llm_max_tokens")]
	pub max_tokens: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
	#[serde(default)]
	pub input_cost_per_1k_tokens: f64,
	#[serde(default)]
	pub output_cost_per_1k_tokens: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Search {
	#[serde(default = "default_max_query_chars")]
	pub max_query_chars: u32,
	#[serde(default = "default_vector_top_k")]
	pub vector_top_k: u32,
	#[serde(default = "default_max_results")]
	pub max_results: u32,
	#[serde(default = "default_true")]
	pub include_rerank_default: bool,
	pub cache: SearchCache,
	#[serde(default)]
	pub enhancement: SearchEnhancement,
	#[serde(default)]
	pub rerank: SearchRerank,
	#[serde(default)]
	pub timeouts: SearchTimeouts,
	#[serde(default)]
	pub sessions: SearchSessions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchCache {
	pub enabled: bool,
	#[serde(default = "default_true")]
	pub static_enabled: bool,
	pub ttl_hours: i64,
	pub max_payload_bytes: Option<u64>,
	/// Seconds between sweeps that delete expired shared-tier rows.
	#[serde(default = "default_purge_interval_secs")]
	pub purge_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchEnhancement {
	pub enabled: bool,
	pub max_enhanced_chars: u32,
}
impl Default for SearchEnhancement {
	fn default() -> Self {
		Self { enabled: true, max_enhanced_chars: 1_000 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchRerank {
	/// One of "sigmoid", "clamp", or "none".
	pub score_normalization: String,
	/// Degrade to vector ranking when the rerank provider itself fails.
	pub fallback_on_error: bool,
}
impl Default for SearchRerank {
	fn default() -> Self {
		Self { score_normalization: "sigmoid".to_string(), fallback_on_error: false }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchTimeouts {
	pub cache_ms: u64,
	pub enhance_ms: u64,
	pub embed_ms: u64,
	pub vector_ms: u64,
	pub hydrate_ms: u64,
	pub rerank_ms: u64,
	pub tracking_ms: u64,
}
impl Default for SearchTimeouts {
	fn default() -> Self {
		Self {
			cache_ms: 250,
			enhance_ms: 8_000,
			embed_ms: 3_000,
			vector_ms: 3_000,
			hydrate_ms: 3_000,
			rerank_ms: 10_000,
			tracking_ms: 1_000,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSessions {
	pub enabled: bool,
}
impl Default for SearchSessions {
	fn default() -> Self {
		Self { enabled: true }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Ranking {
	pub vector_weight: f32,
	pub rerank_weight: f32,
}
impl Default for Ranking {
	fn default() -> Self {
		Self { vector_weight: 0.3, rerank_weight: 0.7 }
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Security {
	pub bind_localhost_only: bool,
}

fn default_llm_max_tokens() -> u32 {
	256
}

fn default_max_query_chars() -> u32 {
	2_000
}

fn default_vector_top_k() -> u32 {
	50
}

fn default_max_results() -> u32 {
	20
}

fn default_true() -> bool {
	true
}

fn default_purge_interval_secs() -> u64 {
	3_600
}
