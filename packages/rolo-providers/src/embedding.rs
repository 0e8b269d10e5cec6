use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result};

/// Provider id for the single-text embed service (`POST {"text": ...}` → `{"embedding": [...]}`).
pub const LOCAL_PROVIDER_ID: &str = "local";

pub async fn embed(
	cfg: &rolo_config::EmbeddingProviderConfig,
	texts: &[String],
) -> Result<Vec<Vec<f32>>> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let headers = crate::auth_headers(&cfg.api_key, &cfg.default_headers)?;

	if cfg.provider_id == LOCAL_PROVIDER_ID {
		let mut vectors = Vec::with_capacity(texts.len());

		for text in texts {
			let body = serde_json::json!({ "text": text });
			let res = client.post(&url).headers(headers.clone()).json(&body).send().await?;
			let json: Value = res.error_for_status()?.json().await?;

			vectors.extend(parse_embedding_response(json)?);
		}

		return Ok(vectors);
	}

	let body = serde_json::json!({
		"model": cfg.model,
		"input": texts,
		"dimensions": cfg.dimensions,
	});
	let res = client.post(url).headers(headers).json(&body).send().await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_embedding_response(json)
}

/// Accepts either `{"data": [{"index", "embedding"}]}` or a single `{"embedding": [...]}`.
pub fn parse_embedding_response(json: Value) -> Result<Vec<Vec<f32>>> {
	if let Some(single) = json.get("embedding") {
		let vector = parse_vector(single)?;

		return Ok(vec![vector]);
	}

	let data = json.get("data").and_then(|v| v.as_array()).ok_or_else(|| {
		Error::InvalidResponse { message: "Embedding response is missing data array.".to_string() }
	})?;
	let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());

	for (fallback_index, item) in data.iter().enumerate() {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.map(|v| v as usize)
			.unwrap_or(fallback_index);
		let embedding = item.get("embedding").ok_or_else(|| Error::InvalidResponse {
			message: "Embedding item missing embedding array.".to_string(),
		})?;

		indexed.push((index, parse_vector(embedding)?));
	}

	indexed.sort_by_key(|(index, _)| *index);

	Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}

fn parse_vector(value: &Value) -> Result<Vec<f32>> {
	let values = value.as_array().ok_or_else(|| Error::InvalidResponse {
		message: "Embedding must be an array.".to_string(),
	})?;
	let mut vec = Vec::with_capacity(values.len());

	for value in values {
		let number = value.as_f64().ok_or_else(|| Error::InvalidResponse {
			message: "Embedding value must be numeric.".to_string(),
		})?;

		vec.push(number as f32);
	}

	Ok(vec)
}
