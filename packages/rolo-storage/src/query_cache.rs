use serde_json::Value;
use sqlx::{PgPool, Row};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::Result;

pub struct CachedPayload {
	pub value: Value,
	pub size_bytes: usize,
}

/// Reads an unexpired entry and bumps its hit counter.
pub async fn fetch_payload(
	pool: &PgPool,
	kind: &str,
	key: &str,
	now: OffsetDateTime,
) -> Result<Option<CachedPayload>> {
	let row = sqlx::query(
		"SELECT payload FROM query_cache WHERE cache_kind = $1 AND cache_key = $2 AND expires_at > $3",
	)
	.bind(kind)
	.bind(key)
	.bind(now)
	.fetch_optional(pool)
	.await?;
	let Some(row) = row else {
		return Ok(None);
	};
	let value: Value = row.try_get("payload")?;
	let size_bytes = serde_json::to_vec(&value)?.len();

	sqlx::query(
		"\
UPDATE query_cache
SET last_accessed_at = $1, hit_count = hit_count + 1
WHERE cache_kind = $2 AND cache_key = $3",
	)
	.bind(now)
	.bind(kind)
	.bind(key)
	.execute(pool)
	.await?;

	Ok(Some(CachedPayload { value, size_bytes }))
}

/// Upserts an entry. Returns the stored size, or `None` when the payload exceeds
/// `max_payload_bytes` and was skipped.
pub async fn store_payload(
	pool: &PgPool,
	kind: &str,
	key: &str,
	payload: &Value,
	now: OffsetDateTime,
	expires_at: OffsetDateTime,
	max_payload_bytes: Option<u64>,
) -> Result<Option<usize>> {
	let payload_size = serde_json::to_vec(payload)?.len();

	if let Some(max) = max_payload_bytes
		&& payload_size as u64 > max
	{
		return Ok(None);
	}

	sqlx::query(
		"\
INSERT INTO query_cache (
	cache_id,
	cache_kind,
	cache_key,
	payload,
	created_at,
	last_accessed_at,
	expires_at,
	hit_count
)
VALUES ($1, $2, $3, $4, $5, $5, $6, 0)
ON CONFLICT (cache_kind, cache_key) DO UPDATE SET
	payload = EXCLUDED.payload,
	last_accessed_at = EXCLUDED.last_accessed_at,
	expires_at = EXCLUDED.expires_at,
	hit_count = 0",
	)
	.bind(Uuid::new_v4())
	.bind(kind)
	.bind(key)
	.bind(payload)
	.bind(now)
	.bind(expires_at)
	.execute(pool)
	.await?;

	Ok(Some(payload_size))
}

pub async fn purge_expired(pool: &PgPool, now: OffsetDateTime) -> Result<u64> {
	let result = sqlx::query("DELETE FROM query_cache WHERE expires_at <= $1")
		.bind(now)
		.execute(pool)
		.await?;

	Ok(result.rows_affected())
}
