use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct ContactRow {
	pub contact_id: Uuid,
	pub owner_id: Uuid,
	pub name: String,
	pub job_title: Option<String>,
	pub company: Option<String>,
	pub email: Option<String>,
	pub message: Option<String>,
	pub notes: Option<String>,
	pub status: Option<String>,
	pub tags: Vec<String>,
	pub summary: Option<String>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Clone, Debug)]
pub struct SearchSessionRow {
	pub session_id: Uuid,
	pub owner_id: Uuid,
	pub query: String,
	pub enhanced_query: String,
	pub cache_type: String,
	pub enhancement_cost: f64,
	pub rerank_cost: f64,
	pub result_count: i32,
	pub duration_ms: i64,
	pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug)]
pub struct SearchSessionStepRow {
	pub step_id: Uuid,
	pub session_id: Uuid,
	pub stage: String,
	pub duration_ms: i64,
	pub cost: f64,
	pub created_at: OffsetDateTime,
}
