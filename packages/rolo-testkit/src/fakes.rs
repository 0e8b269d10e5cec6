//! In-memory implementations of the search seams. Each fake counts its calls and can be switched
//! into a failing or stalling mode at runtime.

use std::{
	collections::HashMap,
	sync::{
		Arc, Mutex, MutexGuard,
		atomic::{AtomicBool, AtomicUsize, Ordering},
	},
	time::Duration,
};

use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use rolo_config::{Config, EmbeddingProviderConfig, LlmProviderConfig, RerankProviderConfig};
use rolo_service::{
	BoxFuture, Completion, ContactRecord, ContactStore, EmbeddingProvider, EnhancementProvider,
	Error, Providers, QueryCacheStore, RerankProvider, Result, RoloService, SessionStep,
	SessionSummary, SessionTracker, Stores, TokenUsage, VectorHit, VectorIndex,
};

use crate::TEST_VECTOR_DIM;

/// Long enough to trip any timeout in the test config.
const STALL: Duration = Duration::from_secs(30);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|err| err.into_inner())
}

#[derive(Default)]
struct Switches {
	calls: AtomicUsize,
	failing: AtomicBool,
	stalled: AtomicBool,
}
impl Switches {
	fn hit(&self) -> (bool, bool) {
		self.calls.fetch_add(1, Ordering::SeqCst);

		(self.failing.load(Ordering::SeqCst), self.stalled.load(Ordering::SeqCst))
	}
}

async fn stall_if(stalled: bool) {
	if stalled {
		tokio::time::sleep(STALL).await;
	}
}

macro_rules! switches {
	() => {
		pub fn calls(&self) -> usize {
			self.switches.calls.load(Ordering::SeqCst)
		}

		pub fn set_failing(&self, failing: bool) {
			self.switches.failing.store(failing, Ordering::SeqCst);
		}

		pub fn set_stalled(&self, stalled: bool) {
			self.switches.stalled.store(stalled, Ordering::SeqCst);
		}
	};
}

/// Replies with a fixed completion and records the last prompt. In echo mode the reply is
/// `{"enhanced_query": "expanded <query>"}` built from the prompt's user content.
pub struct ScriptedEnhancer {
	reply: Mutex<Completion>,
	echo: bool,
	last_messages: Mutex<Vec<Value>>,
	switches: Switches,
}
impl ScriptedEnhancer {
	pub fn new(text: &str, usage: TokenUsage) -> Self {
		Self {
			reply: Mutex::new(Completion { text: text.to_string(), tokens_used: Some(usage) }),
			echo: false,
			last_messages: Mutex::new(Vec::new()),
			switches: Switches::default(),
		}
	}

	pub fn echo() -> Self {
		Self { echo: true, ..Self::json("") }
	}

	/// Replies `{"enhanced_query": <text>}` with 1000 input and 500 output tokens.
	pub fn json(enhanced_query: &str) -> Self {
		let text = serde_json::json!({ "enhanced_query": enhanced_query }).to_string();

		Self::new(&text, TokenUsage { input_tokens: 1_000, output_tokens: 500 })
	}

	switches!();

	pub fn set_reply(&self, text: &str) {
		lock(&self.reply).text = text.to_string();
	}

	pub fn last_messages(&self) -> Vec<Value> {
		lock(&self.last_messages).clone()
	}
}
impl EnhancementProvider for ScriptedEnhancer {
	fn enhance<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, Result<Completion>> {
		let (failing, stalled) = self.switches.hit();

		*lock(&self.last_messages) = messages.to_vec();

		let mut reply = lock(&self.reply).clone();

		if self.echo {
			let query = echoed_query(messages);

			reply.text =
				serde_json::json!({ "enhanced_query": format!("expanded {query}") }).to_string();
		}

		Box::pin(async move {
			stall_if(stalled).await;

			if failing {
				return Err(Error::Provider { message: "enhancer unavailable".to_string() });
			}

			Ok(reply)
		})
	}
}

fn echoed_query(messages: &[Value]) -> String {
	messages
		.iter()
		.rev()
		.find(|message| message["role"] == "user")
		.and_then(|message| message["content"].as_str())
		.and_then(|content| serde_json::from_str::<Value>(content).ok())
		.and_then(|content| content["query"].as_str().map(str::to_string))
		.unwrap_or_default()
}

/// Returns the same vector for every text.
pub struct FixedEmbedding {
	dim: AtomicUsize,
	texts: Mutex<Vec<String>>,
	switches: Switches,
}
impl FixedEmbedding {
	pub fn new() -> Self {
		Self::with_dim(TEST_VECTOR_DIM)
	}

	pub fn with_dim(dim: usize) -> Self {
		Self {
			dim: AtomicUsize::new(dim),
			texts: Mutex::new(Vec::new()),
			switches: Switches::default(),
		}
	}

	switches!();

	pub fn set_dim(&self, dim: usize) {
		self.dim.store(dim, Ordering::SeqCst);
	}

	/// Every text embedded so far, in call order.
	pub fn texts(&self) -> Vec<String> {
		lock(&self.texts).clone()
	}
}
impl Default for FixedEmbedding {
	fn default() -> Self {
		Self::new()
	}
}
impl EmbeddingProvider for FixedEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		let (failing, stalled) = self.switches.hit();
		let dim = self.dim.load(Ordering::SeqCst);

		lock(&self.texts).extend(texts.iter().cloned());

		Box::pin(async move {
			stall_if(stalled).await;

			if failing {
				return Err(Error::Provider {
					message: "embedding service unavailable".to_string(),
				});
			}

			Ok(vec![vec![0.5; dim]; texts.len()])
		})
	}
}

/// Scores each document by the first rule whose keyword it contains.
pub struct ScriptedRerank {
	rules: Vec<(String, f32)>,
	default_score: f32,
	drop_last: AtomicBool,
	queries: Mutex<Vec<String>>,
	documents: Mutex<Vec<String>>,
	switches: Switches,
}
impl ScriptedRerank {
	pub fn new(rules: &[(&str, f32)], default_score: f32) -> Self {
		Self {
			rules: rules.iter().map(|(keyword, score)| (keyword.to_string(), *score)).collect(),
			default_score,
			drop_last: AtomicBool::new(false),
			queries: Mutex::new(Vec::new()),
			documents: Mutex::new(Vec::new()),
			switches: Switches::default(),
		}
	}

	switches!();

	/// Makes the provider return one score fewer than documents.
	pub fn set_drop_last(&self, drop_last: bool) {
		self.drop_last.store(drop_last, Ordering::SeqCst);
	}

	pub fn queries(&self) -> Vec<String> {
		lock(&self.queries).clone()
	}

	/// Documents from the latest call.
	pub fn documents(&self) -> Vec<String> {
		lock(&self.documents).clone()
	}

	fn score(&self, doc: &str) -> f32 {
		self.rules
			.iter()
			.find(|(keyword, _)| doc.contains(keyword.as_str()))
			.map_or(self.default_score, |(_, score)| *score)
	}
}
impl RerankProvider for ScriptedRerank {
	fn rerank<'a>(
		&'a self,
		_cfg: &'a RerankProviderConfig,
		query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, Result<Vec<f32>>> {
		let (failing, stalled) = self.switches.hit();

		lock(&self.queries).push(query.to_string());
		*lock(&self.documents) = docs.to_vec();

		let mut scores: Vec<f32> = docs.iter().map(|doc| self.score(doc)).collect();

		if self.drop_last.load(Ordering::SeqCst) {
			scores.pop();
		}

		Box::pin(async move {
			stall_if(stalled).await;

			if failing {
				return Err(Error::Provider { message: "rerank service unavailable".to_string() });
			}

			Ok(scores)
		})
	}
}

/// Shared cache tier backed by a map. Entries past their TTL read as misses.
#[derive(Default)]
pub struct InMemoryQueryCache {
	entries: Mutex<HashMap<String, (Value, OffsetDateTime)>>,
	puts: AtomicUsize,
	failing_writes: AtomicBool,
	switches: Switches,
}
impl InMemoryQueryCache {
	switches!();

	pub fn set_failing_writes(&self, failing: bool) {
		self.failing_writes.store(failing, Ordering::SeqCst);
	}

	pub fn puts(&self) -> usize {
		self.puts.load(Ordering::SeqCst)
	}

	pub fn len(&self) -> usize {
		lock(&self.entries).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn values(&self) -> Vec<Value> {
		lock(&self.entries).values().map(|(value, _)| value.clone()).collect()
	}
}
impl QueryCacheStore for InMemoryQueryCache {
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Value>>> {
		let (failing, stalled) = self.switches.hit();
		let now = OffsetDateTime::now_utc();
		let value = lock(&self.entries)
			.get(key)
			.filter(|(_, expires_at)| *expires_at > now)
			.map(|(value, _)| value.clone());

		Box::pin(async move {
			stall_if(stalled).await;

			if failing {
				return Err(Error::Storage { message: "cache read refused".to_string() });
			}

			Ok(value)
		})
	}

	fn put<'a>(
		&'a self,
		key: &'a str,
		value: Value,
		ttl: time::Duration,
	) -> BoxFuture<'a, Result<()>> {
		self.puts.fetch_add(1, Ordering::SeqCst);

		let failing = self.failing_writes.load(Ordering::SeqCst);

		Box::pin(async move {
			if failing {
				return Err(Error::Storage { message: "cache write refused".to_string() });
			}

			let expires_at = OffsetDateTime::now_utc() + ttl;

			lock(&self.entries).insert(key.to_string(), (value, expires_at));

			Ok(())
		})
	}

	fn purge_expired<'a>(&'a self, now: OffsetDateTime) -> BoxFuture<'a, Result<u64>> {
		let (failing, _) = self.switches.hit();

		Box::pin(async move {
			if failing {
				return Err(Error::Storage { message: "cache purge refused".to_string() });
			}

			let mut entries = lock(&self.entries);
			let before = entries.len();

			entries.retain(|_, (_, expires_at)| *expires_at > now);

			Ok((before - entries.len()) as u64)
		})
	}
}

/// Returns a fixed hit list, best first, for whichever owner asks.
pub struct StaticVectorIndex {
	hits: Mutex<Vec<VectorHit>>,
	owners: Mutex<Vec<Uuid>>,
	switches: Switches,
}
impl StaticVectorIndex {
	pub fn new(hits: &[(u128, f32)]) -> Self {
		let index = Self {
			hits: Mutex::new(Vec::new()),
			owners: Mutex::new(Vec::new()),
			switches: Switches::default(),
		};

		index.set_hits(hits);

		index
	}

	switches!();

	pub fn set_hits(&self, hits: &[(u128, f32)]) {
		*lock(&self.hits) = hits
			.iter()
			.map(|(id, score)| VectorHit { id: Uuid::from_u128(*id), score: *score })
			.collect();
	}

	/// Owner of every search so far, in call order.
	pub fn owners(&self) -> Vec<Uuid> {
		lock(&self.owners).clone()
	}
}
impl VectorIndex for StaticVectorIndex {
	fn search<'a>(
		&'a self,
		_vector: &'a [f32],
		top_k: u32,
		owner_id: Uuid,
	) -> BoxFuture<'a, Result<Vec<VectorHit>>> {
		let (failing, stalled) = self.switches.hit();

		lock(&self.owners).push(owner_id);

		let hits: Vec<VectorHit> = lock(&self.hits).iter().take(top_k as usize).copied().collect();

		Box::pin(async move {
			stall_if(stalled).await;

			if failing {
				return Err(Error::Qdrant { message: "collection unavailable".to_string() });
			}

			Ok(hits)
		})
	}
}

/// Contact store that honours owner scoping and soft deletes.
#[derive(Default)]
pub struct InMemoryContacts {
	contacts: Mutex<Vec<ContactRecord>>,
	deleted: Mutex<Vec<Uuid>>,
	switches: Switches,
}
impl InMemoryContacts {
	pub fn new(contacts: Vec<ContactRecord>) -> Self {
		Self { contacts: Mutex::new(contacts), ..Self::default() }
	}

	switches!();

	pub fn delete(&self, id: u128) {
		lock(&self.deleted).push(Uuid::from_u128(id));
	}
}
impl ContactStore for InMemoryContacts {
	fn get_many<'a>(
		&'a self,
		ids: &'a [Uuid],
		owner_id: Uuid,
	) -> BoxFuture<'a, Result<Vec<ContactRecord>>> {
		let (failing, stalled) = self.switches.hit();
		let deleted = lock(&self.deleted).clone();
		let found: Vec<ContactRecord> = lock(&self.contacts)
			.iter()
			.filter(|contact| {
				contact.owner_id == owner_id
					&& ids.contains(&contact.id)
					&& !deleted.contains(&contact.id)
			})
			.cloned()
			.collect();

		Box::pin(async move {
			stall_if(stalled).await;

			if failing {
				return Err(Error::Storage { message: "contacts table unavailable".to_string() });
			}

			Ok(found)
		})
	}
}

#[derive(Default)]
pub struct RecordingTracker {
	steps: Mutex<Vec<SessionStep>>,
	sessions: Mutex<Vec<SessionSummary>>,
	switches: Switches,
}
impl RecordingTracker {
	switches!();

	pub fn steps(&self) -> Vec<SessionStep> {
		lock(&self.steps).clone()
	}

	pub fn sessions(&self) -> Vec<SessionSummary> {
		lock(&self.sessions).clone()
	}
}
impl SessionTracker for RecordingTracker {
	fn record_step<'a>(&'a self, step: SessionStep) -> BoxFuture<'a, Result<()>> {
		let (failing, stalled) = self.switches.hit();

		Box::pin(async move {
			stall_if(stalled).await;

			if failing {
				return Err(Error::Storage { message: "step insert refused".to_string() });
			}

			lock(&self.steps).push(step);

			Ok(())
		})
	}

	fn record_session<'a>(&'a self, session: SessionSummary) -> BoxFuture<'a, Result<()>> {
		let (failing, stalled) = self.switches.hit();

		Box::pin(async move {
			stall_if(stalled).await;

			if failing {
				return Err(Error::Storage { message: "session insert refused".to_string() });
			}

			lock(&self.sessions).push(session);

			Ok(())
		})
	}
}

/// One fake per seam, shared with the service so tests can inspect calls afterwards.
#[derive(Clone)]
pub struct FakeStack {
	pub enhancer: Arc<ScriptedEnhancer>,
	pub embedding: Arc<FixedEmbedding>,
	pub rerank: Arc<ScriptedRerank>,
	pub cache: Arc<InMemoryQueryCache>,
	pub index: Arc<StaticVectorIndex>,
	pub contacts: Arc<InMemoryContacts>,
	pub tracker: Arc<RecordingTracker>,
}
impl FakeStack {
	pub fn new(contacts: Vec<ContactRecord>, hits: &[(u128, f32)]) -> Self {
		Self {
			enhancer: Arc::new(ScriptedEnhancer::json("enhanced query")),
			embedding: Arc::new(FixedEmbedding::new()),
			rerank: Arc::new(ScriptedRerank::new(&[], 0.0)),
			cache: Arc::new(InMemoryQueryCache::default()),
			index: Arc::new(StaticVectorIndex::new(hits)),
			contacts: Arc::new(InMemoryContacts::new(contacts)),
			tracker: Arc::new(RecordingTracker::default()),
		}
	}

	pub fn with_enhancer(mut self, enhancer: ScriptedEnhancer) -> Self {
		self.enhancer = Arc::new(enhancer);

		self
	}

	pub fn with_rerank(mut self, rerank: ScriptedRerank) -> Self {
		self.rerank = Arc::new(rerank);

		self
	}

	pub fn service(&self, cfg: Config) -> RoloService {
		let providers =
			Providers::new(self.embedding.clone(), self.rerank.clone(), self.enhancer.clone());
		let stores = Stores::new(
			self.cache.clone(),
			self.index.clone(),
			self.contacts.clone(),
			self.tracker.clone(),
		);

		RoloService::with_parts(cfg, providers, stores)
	}

	/// External calls made so far, across every seam. Cache reads included.
	pub fn external_calls(&self) -> usize {
		self.enhancer.calls()
			+ self.embedding.calls()
			+ self.rerank.calls()
			+ self.cache.calls()
			+ self.cache.puts()
			+ self.index.calls()
			+ self.contacts.calls()
			+ self.tracker.calls()
	}
}
