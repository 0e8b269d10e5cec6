use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStage {
	Validating,
	Enhancing,
	Embedding,
	VectorSearching,
	Hydrating,
	Reranking,
	Finalizing,
	Done,
	Failed,
}
impl SearchStage {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Validating => "validating",
			Self::Enhancing => "enhancing",
			Self::Embedding => "embedding",
			Self::VectorSearching => "vector_searching",
			Self::Hydrating => "hydrating",
			Self::Reranking => "reranking",
			Self::Finalizing => "finalizing",
			Self::Done => "done",
			Self::Failed => "failed",
		}
	}

	/// Stages whose failure aborts the search. Enhancing and Hydrating degrade in place.
	pub fn is_critical(self) -> bool {
		matches!(self, Self::Validating | Self::Embedding | Self::VectorSearching | Self::Reranking)
	}

	pub fn can_transition_to(self, next: Self) -> bool {
		match (self, next) {
			(Self::Validating, Self::Enhancing)
			| (Self::Enhancing, Self::Embedding)
			| (Self::Embedding, Self::VectorSearching)
			| (Self::VectorSearching, Self::Hydrating)
			| (Self::Hydrating, Self::Reranking)
			| (Self::Hydrating, Self::Finalizing)
			| (Self::Reranking, Self::Finalizing)
			| (Self::Finalizing, Self::Done) => true,
			(from, Self::Failed) => from.is_critical(),
			_ => false,
		}
	}
}
impl Display for SearchStage {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Result of one pipeline stage.
#[derive(Debug)]
pub enum StageOutcome<T> {
	Ok(T),
	/// The stage produced a usable fallback value; the reason ends up in `degraded[]`.
	Degraded(T, String),
	Fatal(Error),
}
impl<T> StageOutcome<T> {
	/// Unwraps the value, recording a degraded reason against `stage`.
	pub fn resolve(self, stage: SearchStage, degraded: &mut Vec<DegradedStage>) -> Result<T> {
		match self {
			Self::Ok(value) => Ok(value),
			Self::Degraded(value, reason) => {
				tracing::warn!(stage = stage.as_str(), reason = reason.as_str(), "Stage degraded.");

				degraded.push(DegradedStage { stage, reason });

				Ok(value)
			},
			Self::Fatal(err) => Err(err),
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DegradedStage {
	pub stage: SearchStage,
	pub reason: String,
}

/// Tracks the orchestrator's position and rejects transitions outside the stage table.
#[derive(Debug)]
pub struct StageMachine {
	current: SearchStage,
}
impl StageMachine {
	pub fn new() -> Self {
		Self { current: SearchStage::Validating }
	}

	pub fn current(&self) -> SearchStage {
		self.current
	}

	pub fn advance(&mut self, next: SearchStage) -> Result<()> {
		if !self.current.can_transition_to(next) {
			return Err(Error::InvalidTransition { from: self.current, to: next });
		}

		tracing::debug!(from = self.current.as_str(), to = next.as_str(), "Search stage advanced.");

		self.current = next;

		Ok(())
	}

	/// Moves to `Failed` when the current stage is allowed to fail. Returns whether it moved.
	pub fn fail(&mut self) -> bool {
		if !self.current.can_transition_to(SearchStage::Failed) {
			return false;
		}

		tracing::debug!(from = self.current.as_str(), "Search stage failed.");

		self.current = SearchStage::Failed;

		true
	}
}
impl Default for StageMachine {
	fn default() -> Self {
		Self::new()
	}
}
