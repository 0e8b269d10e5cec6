use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use rolo_storage::models::ContactRow;

/// A contact as stored in the primary store. The search pipeline only reads these.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRecord {
	pub id: Uuid,
	pub owner_id: Uuid,
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub job_title: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub company: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub notes: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<String>,
	#[serde(default)]
	pub tags: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub summary: Option<String>,
	#[serde(with = "rfc3339")]
	pub created_at: OffsetDateTime,
	#[serde(with = "rfc3339")]
	pub updated_at: OffsetDateTime,
}
impl ContactRecord {
	/// Labelled text fields in rerank document order. Empty fields are skipped.
	pub fn labelled_fields(&self) -> Vec<(&'static str, String)> {
		let mut fields = Vec::with_capacity(9);
		let mut push = |label: &'static str, value: Option<&str>| {
			if let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) {
				fields.push((label, value.to_string()));
			}
		};

		push("Name", Some(self.name.as_str()));
		push("Job Title", self.job_title.as_deref());
		push("Company", self.company.as_deref());
		push("Message", self.message.as_deref());
		push("Notes", self.notes.as_deref());
		push("Status", self.status.as_deref());
		push("Email", self.email.as_deref());

		let tags = self
			.tags
			.iter()
			.map(|tag| tag.trim())
			.filter(|tag| !tag.is_empty())
			.collect::<Vec<_>>()
			.join(", ");

		push("Tags", Some(tags.as_str()));
		push("Summary", self.summary.as_deref());

		fields
	}
}
impl From<ContactRow> for ContactRecord {
	fn from(row: ContactRow) -> Self {
		Self {
			id: row.contact_id,
			owner_id: row.owner_id,
			name: row.name,
			job_title: row.job_title,
			company: row.company,
			email: row.email,
			message: row.message,
			notes: row.notes,
			status: row.status,
			tags: row.tags,
			summary: row.summary,
			created_at: row.created_at,
			updated_at: row.updated_at,
		}
	}
}

mod rfc3339 {
	use serde::{Deserialize, Deserializer, Serializer};
	use time::{OffsetDateTime, format_description::well_known::Rfc3339};

	pub fn serialize<S>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		let formatted = value.format(&Rfc3339).map_err(serde::ser::Error::custom)?;

		serializer.serialize_str(&formatted)
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
	where
		D: Deserializer<'de>,
	{
		let raw = String::deserialize(deserializer)?;

		OffsetDateTime::parse(&raw, &Rfc3339).map_err(serde::de::Error::custom)
	}
}

#[cfg(test)]
mod tests {
	use time::OffsetDateTime;
	use uuid::Uuid;

	use crate::contact::ContactRecord;

	fn record() -> ContactRecord {
		ContactRecord {
			id: Uuid::nil(),
			owner_id: Uuid::nil(),
			name: "Ada Lovelace".to_string(),
			job_title: Some("CTO".to_string()),
			company: Some("  ".to_string()),
			email: None,
			message: None,
			notes: Some("Met at RustConf".to_string()),
			status: None,
			tags: vec!["investor".to_string(), " ".to_string(), "mentor".to_string()],
			summary: None,
			created_at: OffsetDateTime::UNIX_EPOCH,
			updated_at: OffsetDateTime::UNIX_EPOCH,
		}
	}

	#[test]
	fn labelled_fields_skip_blanks_and_join_tags() {
		let labels: Vec<(&str, String)> = record().labelled_fields();

		assert_eq!(
			labels,
			vec![
				("Name", "Ada Lovelace".to_string()),
				("Job Title", "CTO".to_string()),
				("Notes", "Met at RustConf".to_string()),
				("Tags", "investor, mentor".to_string()),
			]
		);
	}

	#[test]
	fn serializes_camel_case_with_rfc3339_timestamps() {
		let json = serde_json::to_value(record()).expect("Failed to serialize contact.");

		assert_eq!(json["jobTitle"], "CTO");
		assert_eq!(json["createdAt"], "1970-01-01T00:00:00Z");
		assert!(json.get("email").is_none());
	}
}
