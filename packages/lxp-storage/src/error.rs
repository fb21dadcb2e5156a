#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Database(#[from] sqlx::Error),
	#[error("Vector index request failed: {0}")]
	VectorIndex(#[from] Box<qdrant_client::QdrantError>),
	#[error("Invalid job status: {0}")]
	InvalidStatus(String),
	#[error("Not found: {0}")]
	NotFound(String),
	#[error("Conflict: {0}")]
	Conflict(String),
}
impl From<qdrant_client::QdrantError> for Error {
	fn from(err: qdrant_client::QdrantError) -> Self {
		Self::VectorIndex(Box::new(err))
	}
}
