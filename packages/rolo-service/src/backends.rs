//! Postgres and Qdrant implementations of the pipeline's store seams.

use std::collections::HashMap;

use qdrant_client::qdrant::{PointId, Value as QdrantValue, point_id::PointIdOptions, value::Kind};
use serde_json::Value;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use rolo_storage::{
	contacts,
	models::{SearchSessionRow, SearchSessionStepRow},
	qdrant::{CONTACT_ID_FIELD, QdrantStore},
	query_cache, sessions,
};

use crate::{
	BoxFuture, ContactRecord, ContactStore, QueryCacheStore, Result, SessionStep, SessionSummary,
	SessionTracker, VectorHit, VectorIndex,
};

/// Cache kind under which enhanced queries are stored.
pub const ENHANCEMENT_CACHE_KIND: &str = "enhancement";

pub struct PgQueryCache {
	pool: PgPool,
}
impl PgQueryCache {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}
}
impl QueryCacheStore for PgQueryCache {
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Value>>> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();
			let payload =
				query_cache::fetch_payload(&self.pool, ENHANCEMENT_CACHE_KIND, key, now).await?;

			Ok(payload.map(|payload| payload.value))
		})
	}

	fn put<'a>(
		&'a self,
		key: &'a str,
		value: Value,
		ttl: time::Duration,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();

			query_cache::store_payload(
				&self.pool,
				ENHANCEMENT_CACHE_KIND,
				key,
				&value,
				now,
				now + ttl,
				None,
			)
			.await?;

			Ok(())
		})
	}

	fn purge_expired<'a>(&'a self, now: OffsetDateTime) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move { Ok(query_cache::purge_expired(&self.pool, now).await?) })
	}
}

pub struct PgContactStore {
	pool: PgPool,
}
impl PgContactStore {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}
}
impl ContactStore for PgContactStore {
	fn get_many<'a>(
		&'a self,
		ids: &'a [Uuid],
		owner_id: Uuid,
	) -> BoxFuture<'a, Result<Vec<ContactRecord>>> {
		Box::pin(async move {
			let rows = contacts::get_many(&self.pool, owner_id, ids).await?;

			Ok(rows.into_iter().map(ContactRecord::from).collect())
		})
	}
}

pub struct PgSessionTracker {
	pool: PgPool,
}
impl PgSessionTracker {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}
}
impl SessionTracker for PgSessionTracker {
	fn record_step<'a>(&'a self, step: SessionStep) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let row = SearchSessionStepRow {
				step_id: Uuid::new_v4(),
				session_id: step.session_id,
				stage: step.stage.as_str().to_string(),
				duration_ms: step.duration_ms as i64,
				cost: step.cost,
				created_at: step.recorded_at,
			};

			sessions::insert_step(&self.pool, &row).await?;

			Ok(())
		})
	}

	fn record_session<'a>(&'a self, session: SessionSummary) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let row = SearchSessionRow {
				session_id: session.session_id,
				owner_id: session.owner_id,
				query: session.query,
				enhanced_query: session.enhanced_query,
				cache_type: session.cache_type.as_str().to_string(),
				enhancement_cost: session.costs.enhancement,
				rerank_cost: session.costs.rerank,
				result_count: i32::try_from(session.result_count).unwrap_or(i32::MAX),
				duration_ms: session.duration_ms as i64,
				created_at: session.recorded_at,
			};

			sessions::insert_session(&self.pool, &row).await?;

			Ok(())
		})
	}
}

pub struct QdrantVectorIndex {
	store: QdrantStore,
}
impl QdrantVectorIndex {
	pub fn new(store: QdrantStore) -> Self {
		Self { store }
	}
}
impl VectorIndex for QdrantVectorIndex {
	fn search<'a>(
		&'a self,
		vector: &'a [f32],
		top_k: u32,
		owner_id: Uuid,
	) -> BoxFuture<'a, Result<Vec<VectorHit>>> {
		Box::pin(async move {
			let points =
				self.store.search_dense(vector.to_vec(), top_k, &owner_id.to_string()).await?;
			let mut hits = Vec::with_capacity(points.len());

			for point in points {
				let id = point
					.id
					.as_ref()
					.and_then(point_id_to_uuid)
					.or_else(|| payload_uuid(&point.payload, CONTACT_ID_FIELD));
				let Some(id) = id else {
					tracing::warn!("Vector hit missing contact_id.");

					continue;
				};

				hits.push(VectorHit { id, score: point.score });
			}

			Ok(hits)
		})
	}
}

fn point_id_to_uuid(point_id: &PointId) -> Option<Uuid> {
	match &point_id.point_id_options {
		Some(PointIdOptions::Uuid(id)) => Uuid::parse_str(id).ok(),
		_ => None,
	}
}

fn payload_uuid(payload: &HashMap<String, QdrantValue>, key: &str) -> Option<Uuid> {
	match &payload.get(key)?.kind {
		Some(Kind::StringValue(text)) => Uuid::parse_str(text).ok(),
		_ => None,
	}
}
