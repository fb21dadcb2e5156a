use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, JobId, Result, SubFunction};

/// Envelope published to the tasks exchange. Delivered at least once.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
	pub job_id: JobId,
	pub thread_id: Uuid,
	pub sub_function: SubFunction,
	pub payload: TaskPayload,
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
}
impl TaskMessage {
	pub fn encode(&self) -> Result<Vec<u8>> {
		serde_json::to_vec(self).map_err(|err| Error::MalformedMessage { message: err.to_string() })
	}

	pub fn decode(body: &[u8]) -> Result<Self> {
		serde_json::from_slice(body).map_err(|err| Error::MalformedMessage { message: err.to_string() })
	}
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
	pub user_id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub prompt: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub vectorstore_id: Option<Uuid>,
	#[serde(default)]
	pub params: Map<String, Value>,
	#[serde(default)]
	pub files: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
	Chunk,
	Result,
	Error,
	End,
}
impl ResultKind {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Chunk => "chunk",
			Self::Result => "result",
			Self::Error => "error",
			Self::End => "end",
		}
	}
}

/// Envelope published to the results exchange with the job id as routing key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultMessage {
	pub job_id: JobId,
	#[serde(rename = "type")]
	pub kind: ResultKind,
	#[serde(default)]
	pub payload: Value,
}
impl ResultMessage {
	pub fn chunk(job_id: &JobId, text: impl Into<String>) -> Self {
		Self { job_id: job_id.clone(), kind: ResultKind::Chunk, payload: Value::String(text.into()) }
	}

	pub fn result(job_id: &JobId, payload: Value) -> Self {
		Self { job_id: job_id.clone(), kind: ResultKind::Result, payload }
	}

	pub fn error(job_id: &JobId, message: impl Into<String>) -> Self {
		Self { job_id: job_id.clone(), kind: ResultKind::Error, payload: Value::String(message.into()) }
	}

	pub fn end(job_id: &JobId) -> Self {
		Self { job_id: job_id.clone(), kind: ResultKind::End, payload: Value::String("done".to_string()) }
	}

	/// `end` and `error` close a stream, as does any payload object carrying an `error` field.
	pub fn is_terminal(&self) -> bool {
		match self.kind {
			ResultKind::End | ResultKind::Error => true,
			ResultKind::Chunk | ResultKind::Result =>
				self.payload.as_object().map(|obj| obj.contains_key("error")).unwrap_or(false),
		}
	}

	/// Push-event body: `{"<type>": payload}`.
	pub fn event_body(&self) -> Value {
		let mut body = Map::with_capacity(1);

		body.insert(self.kind.as_str().to_string(), self.payload.clone());

		Value::Object(body)
	}

	pub fn encode(&self) -> Result<Vec<u8>> {
		serde_json::to_vec(self).map_err(|err| Error::MalformedMessage { message: err.to_string() })
	}

	pub fn decode(body: &[u8]) -> Result<Self> {
		serde_json::from_slice(body).map_err(|err| Error::MalformedMessage { message: err.to_string() })
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn result_message_uses_type_field() {
		let job_id = JobId::parse("abc123").expect("Job id should be valid.");
		let encoded =
			ResultMessage::chunk(&job_id, "Hello").encode().expect("Message should encode.");
		let raw: Value = serde_json::from_slice(&encoded).expect("Body should be JSON.");

		assert_eq!(raw, json!({ "job_id": "abc123", "type": "chunk", "payload": "Hello" }));
	}

	#[test]
	fn terminal_detection() {
		let job_id = JobId::parse("abc123").expect("Job id should be valid.");

		assert!(ResultMessage::end(&job_id).is_terminal());
		assert!(ResultMessage::error(&job_id, "boom").is_terminal());
		assert!(!ResultMessage::chunk(&job_id, "x").is_terminal());
		assert!(ResultMessage::result(&job_id, json!({ "error": "bad" })).is_terminal());
		assert!(!ResultMessage::result(&job_id, json!({ "answer": "ok" })).is_terminal());
	}

	#[test]
	fn event_body_is_keyed_by_kind() {
		let job_id = JobId::parse("abc123").expect("Job id should be valid.");

		assert_eq!(ResultMessage::end(&job_id).event_body(), json!({ "end": "done" }));
	}

	#[test]
	fn malformed_task_is_reported() {
		assert!(matches!(TaskMessage::decode(b"{not json"), Err(Error::MalformedMessage { .. })));
	}
}
