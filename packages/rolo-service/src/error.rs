use crate::stage::SearchStage;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Search failed at {stage}: {message}")]
	CriticalStage { stage: SearchStage, message: String },
	#[error("Search cancelled at {stage}.")]
	Cancelled { stage: SearchStage },
	#[error("{stage} timed out after {timeout_ms} ms.")]
	Timeout { stage: SearchStage, timeout_ms: u64 },
	#[error("Invalid stage transition from {from} to {to}.")]
	InvalidTransition { from: SearchStage, to: SearchStage },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Qdrant error: {message}")]
	Qdrant { message: String },
}
impl Error {
	/// Wraps a backend error raised inside a stage that cannot degrade.
	pub fn critical(stage: SearchStage, err: Self) -> Self {
		match err {
			Self::Cancelled { .. } | Self::CriticalStage { .. } | Self::InvalidTransition { .. } =>
				err,
			other => Self::CriticalStage { stage, message: other.to_string() },
		}
	}

	pub fn is_cancelled(&self) -> bool {
		matches!(self, Self::Cancelled { .. })
	}
}

impl From<rolo_storage::Error> for Error {
	fn from(err: rolo_storage::Error) -> Self {
		match err {
			rolo_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			rolo_storage::Error::SerdeJson(inner) => Self::Storage { message: inner.to_string() },
			rolo_storage::Error::Qdrant(inner) => Self::Qdrant { message: inner.to_string() },
		}
	}
}

impl From<rolo_providers::Error> for Error {
	fn from(err: rolo_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
