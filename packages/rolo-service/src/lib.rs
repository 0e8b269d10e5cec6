pub mod backends;
pub mod contact;
pub mod search;
pub mod stage;

mod error;
mod guard;

pub use contact::ContactRecord;
pub use error::{Error, Result};
pub use rolo_providers::enhancer::{Completion, TokenUsage};
pub use search::{
	CacheType, Costs, EnhancedQuery, EnhancementMetadata, EnhancementSummary, RerankFilteringStats,
	RerankMetadata, ResultMetadata, ScoredResult, ScoringMethod, SearchMetadata, SearchRequest,
	SearchResponse, ThresholdStats, Timings,
};
pub use stage::{DegradedStage, SearchStage, StageOutcome};

use std::{future::Future, pin::Pin, sync::Arc};

use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use rolo_config::{Config, EmbeddingProviderConfig, LlmProviderConfig, RerankProviderConfig};
use rolo_providers::{embedding, enhancer, rerank};
use rolo_storage::{db::Db, qdrant::QdrantStore};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EnhancementProvider
where
	Self: Send + Sync,
{
	fn enhance<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, Result<Completion>>;
}

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

pub trait RerankProvider
where
	Self: Send + Sync,
{
	/// Raw relevance scores aligned with `docs`.
	fn rerank<'a>(
		&'a self,
		cfg: &'a RerankProviderConfig,
		query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, Result<Vec<f32>>>;
}

/// Shared tier of the query cache.
pub trait QueryCacheStore
where
	Self: Send + Sync,
{
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Value>>>;

	fn put<'a>(
		&'a self,
		key: &'a str,
		value: Value,
		ttl: time::Duration,
	) -> BoxFuture<'a, Result<()>>;

	/// Deletes entries that expired at or before `now`; returns how many went.
	fn purge_expired<'a>(&'a self, now: OffsetDateTime) -> BoxFuture<'a, Result<u64>>;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VectorHit {
	pub id: Uuid,
	pub score: f32,
}

pub trait VectorIndex
where
	Self: Send + Sync,
{
	/// Nearest neighbours of `vector` among `owner_id`'s contacts, best first.
	fn search<'a>(
		&'a self,
		vector: &'a [f32],
		top_k: u32,
		owner_id: Uuid,
	) -> BoxFuture<'a, Result<Vec<VectorHit>>>;
}

pub trait ContactStore
where
	Self: Send + Sync,
{
	fn get_many<'a>(
		&'a self,
		ids: &'a [Uuid],
		owner_id: Uuid,
	) -> BoxFuture<'a, Result<Vec<ContactRecord>>>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct SessionStep {
	pub session_id: Uuid,
	pub stage: SearchStage,
	pub duration_ms: u64,
	pub cost: f64,
	pub recorded_at: OffsetDateTime,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SessionSummary {
	pub session_id: Uuid,
	pub owner_id: Uuid,
	pub query: String,
	pub enhanced_query: String,
	pub cache_type: CacheType,
	pub costs: Costs,
	pub result_count: usize,
	pub duration_ms: u64,
	pub recorded_at: OffsetDateTime,
}

pub trait SessionTracker
where
	Self: Send + Sync,
{
	fn record_step<'a>(&'a self, step: SessionStep) -> BoxFuture<'a, Result<()>>;

	fn record_session<'a>(&'a self, session: SessionSummary) -> BoxFuture<'a, Result<()>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub rerank: Arc<dyn RerankProvider>,
	pub enhancer: Arc<dyn EnhancementProvider>,
}
impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		rerank: Arc<dyn RerankProvider>,
		enhancer: Arc<dyn EnhancementProvider>,
	) -> Self {
		Self { embedding, rerank, enhancer }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), rerank: provider.clone(), enhancer: provider }
	}
}

#[derive(Clone)]
pub struct Stores {
	pub query_cache: Arc<dyn QueryCacheStore>,
	pub vector_index: Arc<dyn VectorIndex>,
	pub contacts: Arc<dyn ContactStore>,
	pub sessions: Arc<dyn SessionTracker>,
}
impl Stores {
	pub fn new(
		query_cache: Arc<dyn QueryCacheStore>,
		vector_index: Arc<dyn VectorIndex>,
		contacts: Arc<dyn ContactStore>,
		sessions: Arc<dyn SessionTracker>,
	) -> Self {
		Self { query_cache, vector_index, contacts, sessions }
	}

	/// Postgres-backed cache, contacts, and sessions with a Qdrant vector index.
	pub fn postgres(db: &Db, qdrant: QdrantStore) -> Self {
		Self {
			query_cache: Arc::new(backends::PgQueryCache::new(db.pool.clone())),
			vector_index: Arc::new(backends::QdrantVectorIndex::new(qdrant)),
			contacts: Arc::new(backends::PgContactStore::new(db.pool.clone())),
			sessions: Arc::new(backends::PgSessionTracker::new(db.pool.clone())),
		}
	}
}

pub struct RoloService {
	pub cfg: Config,
	pub providers: Providers,
	pub stores: Stores,
}
impl RoloService {
	pub fn new(cfg: Config, db: &Db, qdrant: QdrantStore) -> Self {
		Self { cfg, providers: Providers::default(), stores: Stores::postgres(db, qdrant) }
	}

	pub fn with_parts(cfg: Config, providers: Providers, stores: Stores) -> Self {
		Self { cfg, providers, stores }
	}
}

struct DefaultProviders;
impl EnhancementProvider for DefaultProviders {
	fn enhance<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, Result<Completion>> {
		Box::pin(async move { Ok(enhancer::complete(cfg, messages).await?) })
	}
}
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move { Ok(embedding::embed(cfg, texts).await?) })
	}
}
impl RerankProvider for DefaultProviders {
	fn rerank<'a>(
		&'a self,
		cfg: &'a RerankProviderConfig,
		query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, Result<Vec<f32>>> {
		Box::pin(async move { Ok(rerank::rerank(cfg, query, docs).await?) })
	}
}
