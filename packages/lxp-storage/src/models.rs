use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Job {
	pub job_id: String,
	pub thread_id: Uuid,
	pub user_id: String,
	pub sub_function: String,
	pub payload: Value,
	pub status: String,
	pub error: Option<String>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug)]
pub struct NewJob<'a> {
	pub job_id: &'a str,
	pub thread_id: Uuid,
	pub user_id: &'a str,
	pub sub_function: &'a str,
	pub payload: &'a Value,
	pub thread_title: &'a str,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Vectorstore {
	pub vectorstore_id: Uuid,
	pub created_by: Option<String>,
	pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct VectorstoreFile {
	pub file_id: Uuid,
	pub vectorstore_id: Uuid,
	pub filename: String,
	pub content_hash: String,
	pub body: String,
	pub uploaded_by: Option<String>,
	pub created_at: OffsetDateTime,
}

#[derive(Debug)]
pub struct NewFile<'a> {
	pub file_id: Uuid,
	pub vectorstore_id: Uuid,
	pub filename: &'a str,
	pub content_hash: &'a str,
	pub body: &'a str,
	pub uploaded_by: Option<&'a str>,
}
