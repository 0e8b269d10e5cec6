use axum::{
	Json, Router,
	extract::{State, rejection::JsonRejection},
	http::{HeaderMap, StatusCode},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::Serialize;
use uuid::Uuid;

use rolo_service::{Error, SearchRequest, SearchResponse};

use crate::state::AppState;

/// Owner scope of the caller. Authentication happens upstream.
pub const OWNER_HEADER: &str = "x-rolo-owner-id";

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/search", post(search))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn search(
	State(state): State<AppState>,
	headers: HeaderMap,
	payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchBody>, ApiError> {
	let owner_id = owner_id(&headers)?;
	let Json(req) = payload.map_err(|err| ApiError::bad_request(err.body_text()))?;
	let response = state.service.search(owner_id, req).await?;

	Ok(Json(SearchBody { success: true, response }))
}

fn owner_id(headers: &HeaderMap) -> Result<Uuid, ApiError> {
	let raw = headers
		.get(OWNER_HEADER)
		.ok_or_else(|| ApiError::bad_request("X-Rolo-Owner-Id header is required."))?;

	raw.to_str()
		.ok()
		.and_then(|value| Uuid::parse_str(value.trim()).ok())
		.ok_or_else(|| ApiError::bad_request("X-Rolo-Owner-Id header must be a UUID."))
}

#[derive(Debug, Serialize)]
struct SearchBody {
	success: bool,
	#[serde(flatten)]
	response: SearchResponse,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	success: bool,
	error: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	message: String,
}
impl ApiError {
	fn new(status: StatusCode, message: impl Into<String>) -> Self {
		Self { status, message: message.into() }
	}

	fn bad_request(message: impl Into<String>) -> Self {
		Self::new(StatusCode::BAD_REQUEST, message)
	}
}
impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		match err {
			Error::InvalidRequest { message } => Self::bad_request(message),
			other => {
				tracing::error!(error = %other, "Search request failed.");

				Self::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
			},
		}
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { success: false, error: self.message };

		(self.status, Json(body)).into_response()
	}
}
