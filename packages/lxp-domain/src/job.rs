use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

const MAX_JOB_ID_CHARS: usize = 128;

/// Opaque job token. Doubles as the results routing key, so it may never contain topic
/// separators or wildcards.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);
impl JobId {
	pub fn mint() -> Self {
		Self(Uuid::new_v4().simple().to_string())
	}

	pub fn parse(raw: &str) -> Result<Self> {
		if raw.is_empty() {
			return Err(Error::InvalidJobId { message: "job id must be non-empty.".to_string() });
		}
		if raw.len() > MAX_JOB_ID_CHARS {
			return Err(Error::InvalidJobId {
				message: format!("job id must be at most {MAX_JOB_ID_CHARS} bytes."),
			});
		}
		if !raw.bytes().all(|b| b.is_ascii_graphic() && !matches!(b, b'.' | b'*' | b'#')) {
			return Err(Error::InvalidJobId {
				message: "job id must be printable ASCII without '.', '*', or '#'.".to_string(),
			});
		}

		Ok(Self(raw.to_string()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl fmt::Display for JobId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}
impl TryFrom<String> for JobId {
	type Error = Error;

	fn try_from(value: String) -> Result<Self> {
		Self::parse(&value)
	}
}
impl From<JobId> for String {
	fn from(value: JobId) -> Self {
		value.0
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
	Queued,
	Running,
	Done,
	Error,
}
impl JobStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Queued => "queued",
			Self::Running => "running",
			Self::Done => "done",
			Self::Error => "error",
		}
	}

	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Done | Self::Error)
	}

	/// Forward-only transitions. A running job may be marked running again on redelivery.
	pub fn can_transition_to(self, next: Self) -> bool {
		matches!(
			(self, next),
			(Self::Queued, Self::Running)
				| (Self::Queued, Self::Error)
				| (Self::Running, Self::Running)
				| (Self::Running, Self::Done)
				| (Self::Running, Self::Error)
		)
	}
}
impl fmt::Display for JobStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for JobStatus {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"queued" => Ok(Self::Queued),
			"running" => Ok(Self::Running),
			"done" => Ok(Self::Done),
			"error" => Ok(Self::Error),
			other => Err(Error::UnknownStatus { name: other.to_string() }),
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubFunction {
	Assist,
	Galaxy,
	Coach,
	Translate,
	Index,
}
impl SubFunction {
	pub const ALL: [Self; 5] =
		[Self::Assist, Self::Galaxy, Self::Coach, Self::Translate, Self::Index];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Assist => "assist",
			Self::Galaxy => "galaxy",
			Self::Coach => "coach",
			Self::Translate => "translate",
			Self::Index => "index",
		}
	}

	pub fn queue_name(self) -> String {
		format!("q.{}", self.as_str())
	}

	/// Topic pattern binding this sub-function's queue to the tasks exchange.
	pub fn binding_key(self) -> String {
		format!("{}.*", self.as_str())
	}

	/// Routing key used when publishing a task. The literal `*` word matches the binding's
	/// wildcard.
	pub fn routing_key(self) -> String {
		self.binding_key()
	}
}
impl fmt::Display for SubFunction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for SubFunction {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		Self::ALL
			.into_iter()
			.find(|sub| sub.as_str() == s)
			.ok_or_else(|| Error::UnknownSubFunction { name: s.to_string() })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn minted_ids_are_routing_safe() {
		let id = JobId::mint();

		assert_eq!(id.as_str().len(), 32);
		assert!(JobId::parse(id.as_str()).is_ok());
		assert_ne!(JobId::mint(), id);
	}

	#[test]
	fn wildcards_are_rejected() {
		for raw in ["", "a.b", "*", "#", "job id"] {
			assert!(JobId::parse(raw).is_err(), "{raw:?} should be rejected");
		}

		assert!(JobId::parse("abc123").is_ok());
	}

	#[test]
	fn job_id_deserialization_validates() {
		let err = serde_json::from_str::<JobId>("\"a.#\"");

		assert!(err.is_err());
	}

	#[test]
	fn status_never_regresses() {
		assert!(JobStatus::Queued.can_transition_to(JobStatus::Running));
		assert!(JobStatus::Running.can_transition_to(JobStatus::Done));
		assert!(!JobStatus::Done.can_transition_to(JobStatus::Running));
		assert!(!JobStatus::Error.can_transition_to(JobStatus::Done));
		assert!(!JobStatus::Running.can_transition_to(JobStatus::Queued));
	}

	#[test]
	fn sub_function_topology_names() {
		let sub: SubFunction = "assist".parse().expect("Sub-function should be known.");

		assert_eq!(sub.queue_name(), "q.assist");
		assert_eq!(sub.binding_key(), "assist.*");
		assert_eq!(sub.routing_key(), "assist.*");
		assert!("summarize".parse::<SubFunction>().is_err());
	}
}
