use std::time::Duration;

use color_eyre::{Result, eyre};
use reqwest::{
	Client,
	header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue},
};
use serde_json::{Map, Value};

use lxp_config::LlmProviderConfig;

/// A configured provider. The HTTP client and its headers are built once and reused.
pub struct ChatClient {
	client: Client,
	url: String,
	model: String,
	temperature: f32,
}
impl ChatClient {
	pub fn new(cfg: &LlmProviderConfig) -> Result<Self> {
		let client = Client::builder()
			.timeout(Duration::from_millis(cfg.timeout_ms))
			.default_headers(request_headers(&cfg.api_key, &cfg.default_headers)?)
			.build()?;

		Ok(Self {
			client,
			url: format!("{}{}", cfg.api_base.trim_end_matches('/'), cfg.path),
			model: cfg.model.clone(),
			temperature: cfg.temperature,
		})
	}

	/// Sends `messages` and returns the text of the first choice.
	pub async fn complete(&self, messages: &[Value]) -> Result<String> {
		let body = serde_json::json!({
			"model": self.model,
			"temperature": self.temperature,
			"messages": messages,
		});
		let response = self.client.post(&self.url).json(&body).send().await?.error_for_status()?;
		let json = response.json::<Value>().await?;

		first_choice_text(&json)
	}
}

pub fn request_headers(api_key: &str, extra: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();
	let mut bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))?;

	bearer.set_sensitive(true);
	headers.insert(AUTHORIZATION, bearer);

	for (name, value) in extra {
		let value = value
			.as_str()
			.ok_or_else(|| eyre::eyre!("Header {name:?} must have a string value."))?;

		headers.insert(HeaderName::from_bytes(name.as_bytes())?, HeaderValue::from_str(value)?);
	}

	Ok(headers)
}

pub fn first_choice_text(json: &Value) -> Result<String> {
	json.pointer("/choices/0/message/content")
		.and_then(Value::as_str)
		.map(str::to_string)
		.ok_or_else(|| eyre::eyre!("Completion response has no message content."))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn first_choice_wins() {
		let json = serde_json::json!({
			"choices": [
				{ "message": { "role": "assistant", "content": "Bonjour le monde." } },
				{ "message": { "role": "assistant", "content": "Salut." } }
			]
		});

		assert_eq!(first_choice_text(&json).ok().as_deref(), Some("Bonjour le monde."));
	}

	#[test]
	fn empty_choices_are_an_error() {
		assert!(first_choice_text(&serde_json::json!({ "choices": [] })).is_err());
		assert!(first_choice_text(&serde_json::json!({ "error": "rate limited" })).is_err());
	}
}
