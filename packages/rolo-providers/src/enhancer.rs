use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
	pub input_tokens: u32,
	pub output_tokens: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Completion {
	pub text: String,
	pub tokens_used: Option<TokenUsage>,
}

/// Sends a chat completion and returns the first choice's content with its token usage.
pub async fn complete(
	cfg: &rolo_config::LlmProviderConfig,
	messages: &[Value],
) -> Result<Completion> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"max_tokens": cfg.max_tokens,
		"messages": messages,
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_completion(json)
}

pub fn parse_completion(json: Value) -> Result<Completion> {
	let text = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
		.ok_or_else(|| Error::InvalidResponse {
			message: "Completion response is missing message content.".to_string(),
		})?;
	let tokens_used = json.get("usage").map(|usage| {
		let count = |key: &str| usage.get(key).and_then(|v| v.as_u64()).unwrap_or(0) as u32;

		TokenUsage {
			input_tokens: count("prompt_tokens"),
			output_tokens: count("completion_tokens"),
		}
	});

	Ok(Completion { text: text.to_string(), tokens_used })
}
