use std::cmp::Ordering;

use rolo_config::Ranking;

use crate::{ContactRecord, search::ScoringMethod};

#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
	pub contact: ContactRecord,
	pub vector_score: f32,
	pub rerank_score: Option<f32>,
	pub hybrid_score: Option<f32>,
}
impl Candidate {
	pub fn new(contact: ContactRecord, vector_score: f32) -> Self {
		Self { contact, vector_score, rerank_score: None, hybrid_score: None }
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScoreNormalization {
	/// Logistic squash for raw cross-encoder logits.
	Sigmoid,
	Clamp,
	None,
}
impl ScoreNormalization {
	/// Unknown names fall back to sigmoid; config validation rejects them earlier.
	pub fn parse(raw: &str) -> Self {
		match raw.trim().to_ascii_lowercase().as_str() {
			"clamp" => Self::Clamp,
			"none" => Self::None,
			_ => Self::Sigmoid,
		}
	}

	pub fn apply(self, raw: f32) -> f32 {
		if !raw.is_finite() {
			return 0.0;
		}

		match self {
			Self::Sigmoid => 1.0 / (1.0 + (-raw).exp()),
			Self::Clamp => raw.clamp(0.0, 1.0),
			Self::None => raw,
		}
	}
}

pub fn hybrid_score(vector_score: f32, rerank_score: f32, ranking: &Ranking) -> f32 {
	ranking.vector_weight * vector_score + ranking.rerank_weight * rerank_score
}

/// Vector similarity squashed into [0, 1]. Non-finite scores count as zero.
pub fn clamp_vector_score(raw: f32) -> f32 {
	if raw.is_finite() { raw.clamp(0.0, 1.0) } else { 0.0 }
}

pub fn cmp_f32_desc(a: f32, b: f32) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}

/// Sorts best first. Rerank ordering uses the hybrid score; ties fall back to vector score and
/// then contact id so equal inputs always rank the same way.
pub fn sort_candidates(candidates: &mut [Candidate], method: ScoringMethod) {
	candidates.sort_by(|a, b| {
		let primary = match method {
			ScoringMethod::Rerank => cmp_f32_desc(
				a.hybrid_score.unwrap_or(a.vector_score),
				b.hybrid_score.unwrap_or(b.vector_score),
			),
			ScoringMethod::Vector => Ordering::Equal,
		};

		primary
			.then_with(|| cmp_f32_desc(a.vector_score, b.vector_score))
			.then_with(|| a.contact.id.cmp(&b.contact.id))
	});
}

/// Labels of contact fields that contain at least one query tag.
pub fn matched_fields(contact: &ContactRecord, tags: &[String]) -> Vec<String> {
	if tags.is_empty() {
		return Vec::new();
	}

	contact
		.labelled_fields()
		.into_iter()
		.filter(|(_, value)| {
			let value = value.to_lowercase();

			tags.iter().any(|tag| value.contains(tag.as_str()))
		})
		.map(|(label, _)| label.to_string())
		.collect()
}

#[cfg(test)]
mod tests {
	use time::OffsetDateTime;
	use uuid::Uuid;

	use super::*;

	fn contact(id: u128, name: &str) -> ContactRecord {
		ContactRecord {
			id: Uuid::from_u128(id),
			owner_id: Uuid::nil(),
			name: name.to_string(),
			job_title: Some("Chief Executive Officer".to_string()),
			company: Some("Acme".to_string()),
			email: None,
			message: None,
			notes: None,
			status: None,
			tags: Vec::new(),
			summary: None,
			created_at: OffsetDateTime::UNIX_EPOCH,
			updated_at: OffsetDateTime::UNIX_EPOCH,
		}
	}

	#[test]
	fn hybrid_follows_configured_weights() {
		let ranking = Ranking { vector_weight: 0.3, rerank_weight: 0.7 };

		for (v, r) in [(0.0, 0.0), (1.0, 1.0), (0.42, 0.91), (0.9, 0.1)] {
			let expected = 0.3 * v + 0.7 * r;

			assert!((hybrid_score(v, r, &ranking) - expected).abs() < 1e-6);
		}
	}

	#[test]
	fn normalization_modes() {
		assert!((ScoreNormalization::Sigmoid.apply(0.0) - 0.5).abs() < 1e-6);
		assert!(ScoreNormalization::Sigmoid.apply(8.0) > 0.99);
		assert!(ScoreNormalization::Sigmoid.apply(-8.0) < 0.01);
		assert_eq!(ScoreNormalization::Clamp.apply(1.7), 1.0);
		assert_eq!(ScoreNormalization::Clamp.apply(-0.2), 0.0);
		assert_eq!(ScoreNormalization::None.apply(-0.2), -0.2);
		assert_eq!(ScoreNormalization::Sigmoid.apply(f32::NAN), 0.0);
		assert_eq!(ScoreNormalization::parse(" CLAMP "), ScoreNormalization::Clamp);
	}

	#[test]
	fn vector_scores_are_clamped() {
		assert_eq!(clamp_vector_score(1.0001), 1.0);
		assert_eq!(clamp_vector_score(-0.3), 0.0);
		assert_eq!(clamp_vector_score(f32::NAN), 0.0);
		assert_eq!(clamp_vector_score(0.5), 0.5);
	}

	#[test]
	fn sort_is_deterministic_on_ties() {
		let mut candidates = vec![
			Candidate { hybrid_score: Some(0.5), ..Candidate::new(contact(3, "C"), 0.4) },
			Candidate { hybrid_score: Some(0.5), ..Candidate::new(contact(1, "A"), 0.4) },
			Candidate { hybrid_score: Some(0.5), ..Candidate::new(contact(2, "B"), 0.6) },
			Candidate { hybrid_score: Some(0.9), ..Candidate::new(contact(4, "D"), 0.1) },
		];

		sort_candidates(&mut candidates, ScoringMethod::Rerank);

		let order: Vec<&str> = candidates.iter().map(|c| c.contact.name.as_str()).collect();

		assert_eq!(order, vec!["D", "B", "A", "C"]);

		sort_candidates(&mut candidates, ScoringMethod::Vector);

		let order: Vec<&str> = candidates.iter().map(|c| c.contact.name.as_str()).collect();

		assert_eq!(order, vec!["B", "A", "C", "D"]);
	}

	#[test]
	fn matched_fields_use_lowercase_tags() {
		let tags = vec!["executive".to_string(), "acme".to_string(), "zebra".to_string()];

		assert_eq!(matched_fields(&contact(1, "Ada"), &tags), vec!["Job Title", "Company"]);
		assert!(matched_fields(&contact(1, "Ada"), &[]).is_empty());
	}
}
