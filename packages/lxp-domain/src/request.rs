use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{Error, Result, SubFunction, TaskPayload};

pub const MAX_PROMPT_CHARS: usize = 16_000;

/// Client-facing job submission body.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct JobRequest {
	pub user_id: String,
	#[serde(default)]
	pub prompt: Option<String>,
	#[serde(default)]
	pub vectorstore_id: Option<String>,
	/// Existing conversation to append to. A new thread is minted when absent.
	#[serde(default)]
	pub thread_id: Option<Uuid>,
	#[serde(default)]
	pub params: Map<String, Value>,
	#[serde(default)]
	pub files: Vec<String>,
}
impl JobRequest {
	/// Checks the request against the sub-function's schema and produces the task payload.
	pub fn validate(&self, sub_function: SubFunction) -> Result<TaskPayload> {
		let user_id = self.user_id.trim();

		if user_id.is_empty() {
			return Err(invalid("user_id", "must be non-empty."));
		}

		let prompt = self.prompt.as_deref().map(str::trim).filter(|p| !p.is_empty());

		if let Some(prompt) = prompt
			&& prompt.chars().count() > MAX_PROMPT_CHARS
		{
			return Err(invalid("prompt", &format!("must be at most {MAX_PROMPT_CHARS} characters.")));
		}

		let vectorstore_id = match self.vectorstore_id.as_deref().map(str::trim) {
			None | Some("") => None,
			Some(raw) => Some(
				Uuid::parse_str(raw).map_err(|_| invalid("vectorstore_id", "must be a UUID."))?,
			),
		};

		match sub_function {
			SubFunction::Assist => {
				if prompt.is_none() {
					return Err(invalid("prompt", "is required for assist."));
				}
				if vectorstore_id.is_none() {
					return Err(invalid("vectorstore_id", "is required for assist."));
				}
			},
			SubFunction::Galaxy | SubFunction::Coach | SubFunction::Translate =>
				if prompt.is_none() {
					return Err(invalid("prompt", &format!("is required for {sub_function}.")));
				},
			SubFunction::Index =>
				if vectorstore_id.is_none() {
					return Err(invalid("vectorstore_id", "is required for index."));
				},
		}

		if sub_function == SubFunction::Translate
			&& let Some(target) = self.params.get("target_lang")
			&& !target.as_str().map(|t| !t.trim().is_empty()).unwrap_or(false)
		{
			return Err(invalid("params.target_lang", "must be a non-empty string."));
		}

		Ok(TaskPayload {
			user_id: user_id.to_string(),
			prompt: prompt.map(str::to_string),
			vectorstore_id,
			params: self.params.clone(),
			files: self.files.clone(),
		})
	}
}

fn invalid(field: &str, message: &str) -> Error {
	Error::Validation { field: field.to_string(), message: message.to_string() }
}
