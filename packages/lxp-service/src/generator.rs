use serde_json::{Map, Value};

use lxp_config::LlmProviderConfig;
use lxp_domain::{BoxFuture, SubFunction};
use lxp_providers::ChatClient;
use lxp_retrieval::{Evidence, compose};

use crate::Result;

const DEFAULT_TARGET_LANG: &str = "English";

pub struct GenerationRequest<'a> {
	pub sub_function: SubFunction,
	pub prompt: &'a str,
	/// Retrieved context, best first. Empty when the job named no vectorstore.
	pub evidence: &'a [Evidence],
	pub params: &'a Map<String, Value>,
}

/// Produces the text answer for the open-ended sub-functions.
pub trait Generator
where
	Self: Send + Sync,
{
	fn generate<'a>(&'a self, request: &'a GenerationRequest<'a>) -> BoxFuture<'a, Result<String>>;
}

/// Chat completion against the configured OpenAI-compatible provider.
pub struct HttpGenerator {
	client: ChatClient,
}
impl HttpGenerator {
	pub fn new(cfg: &LlmProviderConfig) -> Result<Self> {
		Ok(Self { client: ChatClient::new(cfg)? })
	}
}
impl Generator for HttpGenerator {
	fn generate<'a>(&'a self, request: &'a GenerationRequest<'a>) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move {
			let text = self.client.complete(&build_messages(request)).await?;

			Ok(text)
		})
	}
}

/// Offline generator used when no provider is configured. Answers from evidence when there is
/// some and echoes the prompt otherwise.
pub struct EchoGenerator;
impl Generator for EchoGenerator {
	fn generate<'a>(&'a self, request: &'a GenerationRequest<'a>) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move {
			if request.evidence.is_empty() {
				return Ok(request.prompt.to_string());
			}

			Ok(compose(request.prompt, request.evidence).text)
		})
	}
}

pub fn build_messages(request: &GenerationRequest<'_>) -> Vec<Value> {
	let mut user = String::new();

	if !request.evidence.is_empty() {
		user.push_str("Context:\n");

		for (rank, item) in request.evidence.iter().enumerate() {
			user.push_str(&format!("[{}] ({}) {}\n", rank + 1, item.filename, item.text));
		}

		user.push('\n');
	}

	user.push_str(request.prompt);

	vec![
		serde_json::json!({ "role": "system", "content": system_prompt(request) }),
		serde_json::json!({ "role": "user", "content": user }),
	]
}

fn system_prompt(request: &GenerationRequest<'_>) -> String {
	match request.sub_function {
		SubFunction::Translate => {
			let target = request
				.params
				.get("target_lang")
				.and_then(Value::as_str)
				.map(str::trim)
				.filter(|lang| !lang.is_empty())
				.unwrap_or(DEFAULT_TARGET_LANG);

			format!(
				"Translate the user's text into {target}. Reply with the translation only, keeping \
				 the original formatting."
			)
		},
		SubFunction::Coach =>
			"You are a learning coach. Recommend concrete courses and next study steps for the \
			 learner's goal. Use the context when it is provided and do not invent course names."
				.to_string(),
		SubFunction::Galaxy =>
			"You map a topic into related subjects a learner could explore next. Reply with short \
			 sentences, one idea each, grounded in the context when it is provided."
				.to_string(),
		SubFunction::Assist | SubFunction::Index =>
			"Answer the question using only the provided context. Say so when the context does \
			 not contain the answer."
				.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use uuid::Uuid;

	use super::*;

	#[test]
	fn translate_prompt_names_target_language() {
		let mut params = Map::new();

		params.insert("target_lang".to_string(), Value::from("Korean"));

		let request = GenerationRequest {
			sub_function: SubFunction::Translate,
			prompt: "Good morning.",
			evidence: &[],
			params: &params,
		};
		let messages = build_messages(&request);

		assert_eq!(messages.len(), 2);
		assert!(messages[0]["content"].as_str().unwrap_or_default().contains("Korean"));
		assert_eq!(messages[1]["content"], "Good morning.");
	}

	#[test]
	fn evidence_is_numbered_in_user_message() {
		let evidence = vec![Evidence {
			text: "Rust 101 covers ownership.".to_string(),
			score: 0.8,
			filename: "courses.txt".to_string(),
			file_id: Uuid::nil(),
			ordinal: 0,
		}];
		let params = Map::new();
		let request = GenerationRequest {
			sub_function: SubFunction::Coach,
			prompt: "What should I learn first?",
			evidence: &evidence,
			params: &params,
		};
		let user = build_messages(&request)[1]["content"].as_str().unwrap_or_default().to_string();

		assert!(user.starts_with("Context:\n[1] (courses.txt) Rust 101 covers ownership."));
		assert!(user.ends_with("What should I learn first?"));
	}

	#[tokio::test]
	async fn echo_without_evidence_returns_prompt() {
		let params = Map::new();
		let request = GenerationRequest {
			sub_function: SubFunction::Galaxy,
			prompt: "Black holes",
			evidence: &[],
			params: &params,
		};

		assert_eq!(EchoGenerator.generate(&request).await.ok().as_deref(), Some("Black holes"));
	}
}
