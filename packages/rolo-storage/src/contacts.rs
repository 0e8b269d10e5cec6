use sqlx::PgExecutor;
use uuid::Uuid;

use crate::{Result, models::ContactRow};

/// Loads live contacts of `owner_id` whose ids are in `ids`. Row order is unspecified.
pub async fn get_many<'e, E>(executor: E, owner_id: Uuid, ids: &[Uuid]) -> Result<Vec<ContactRow>>
where
	E: PgExecutor<'e>,
{
	if ids.is_empty() {
		return Ok(Vec::new());
	}

	let rows = sqlx::query_as::<_, ContactRow>(
		"\
SELECT
	contact_id,
	owner_id,
	name,
	job_title,
	company,
	email,
	message,
	notes,
	status,
	tags,
	summary,
	created_at,
	updated_at
FROM contacts
WHERE owner_id = $1
	AND deleted_at IS NULL
	AND contact_id = ANY($2)",
	)
	.bind(owner_id)
	.bind(ids)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn upsert<'e, E>(executor: E, contact: &ContactRow) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO contacts (
	contact_id,
	owner_id,
	name,
	job_title,
	company,
	email,
	message,
	notes,
	status,
	tags,
	summary,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
ON CONFLICT (contact_id) DO UPDATE SET
	name = EXCLUDED.name,
	job_title = EXCLUDED.job_title,
	company = EXCLUDED.company,
	email = EXCLUDED.email,
	message = EXCLUDED.message,
	notes = EXCLUDED.notes,
	status = EXCLUDED.status,
	tags = EXCLUDED.tags,
	summary = EXCLUDED.summary,
	updated_at = EXCLUDED.updated_at",
	)
	.bind(contact.contact_id)
	.bind(contact.owner_id)
	.bind(contact.name.as_str())
	.bind(contact.job_title.as_deref())
	.bind(contact.company.as_deref())
	.bind(contact.email.as_deref())
	.bind(contact.message.as_deref())
	.bind(contact.notes.as_deref())
	.bind(contact.status.as_deref())
	.bind(&contact.tags)
	.bind(contact.summary.as_deref())
	.bind(contact.created_at)
	.bind(contact.updated_at)
	.execute(executor)
	.await?;

	Ok(())
}
