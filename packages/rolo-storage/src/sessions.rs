use sqlx::PgExecutor;

use crate::{
	Result,
	models::{SearchSessionRow, SearchSessionStepRow},
};

pub async fn insert_session<'e, E>(executor: E, row: &SearchSessionRow) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO search_sessions (
	session_id,
	owner_id,
	query,
	enhanced_query,
	cache_type,
	enhancement_cost,
	rerank_cost,
	result_count,
	duration_ms,
	created_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
ON CONFLICT (session_id) DO NOTHING",
	)
	.bind(row.session_id)
	.bind(row.owner_id)
	.bind(row.query.as_str())
	.bind(row.enhanced_query.as_str())
	.bind(row.cache_type.as_str())
	.bind(row.enhancement_cost)
	.bind(row.rerank_cost)
	.bind(row.result_count)
	.bind(row.duration_ms)
	.bind(row.created_at)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn insert_step<'e, E>(executor: E, row: &SearchSessionStepRow) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO search_session_steps (step_id, session_id, stage, duration_ms, cost, created_at)
VALUES ($1, $2, $3, $4, $5, $6)",
	)
	.bind(row.step_id)
	.bind(row.session_id)
	.bind(row.stage.as_str())
	.bind(row.duration_ms)
	.bind(row.cost)
	.bind(row.created_at)
	.execute(executor)
	.await?;

	Ok(())
}
