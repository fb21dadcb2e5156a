//! Persistence capabilities consumed by intake, workers and the HTTP layer.

use uuid::Uuid;

use lxp_domain::{BoxFuture, JobStatus};

use crate::{
	Result,
	db::Db,
	models::{Job, NewFile, NewJob, Vectorstore, VectorstoreFile},
	queries,
};

pub trait JobStore
where
	Self: Send + Sync,
{
	/// Records a queued job together with its thread.
	fn insert_job<'a>(&'a self, job: &'a NewJob<'a>) -> BoxFuture<'a, Result<()>>;

	/// Returns false when the job is unknown or already terminal.
	fn mark_job_running<'a>(&'a self, job_id: &'a str) -> BoxFuture<'a, Result<bool>>;

	/// Moves a non-terminal job to `status`. Returns false when nothing changed.
	fn finish_job<'a>(
		&'a self,
		job_id: &'a str,
		status: JobStatus,
		error: Option<&'a str>,
	) -> BoxFuture<'a, Result<bool>>;

	fn fetch_job<'a>(&'a self, job_id: &'a str) -> BoxFuture<'a, Result<Option<Job>>>;
}

pub trait VectorstoreCatalog
where
	Self: Send + Sync,
{
	fn create_vectorstore<'a>(
		&'a self,
		vectorstore_id: Uuid,
		created_by: Option<&'a str>,
	) -> BoxFuture<'a, Result<Vectorstore>>;

	fn fetch_vectorstore(&self, vectorstore_id: Uuid) -> BoxFuture<'_, Result<Option<Vectorstore>>>;

	/// Stores a file body. Identical content in the same vectorstore keeps its original id.
	fn upsert_file<'a>(&'a self, file: &'a NewFile<'a>) -> BoxFuture<'a, Result<VectorstoreFile>>;

	/// Files in upload order.
	fn list_files(&self, vectorstore_id: Uuid) -> BoxFuture<'_, Result<Vec<VectorstoreFile>>>;
}

impl JobStore for Db {
	fn insert_job<'a>(&'a self, job: &'a NewJob<'a>) -> BoxFuture<'a, Result<()>> {
		Box::pin(queries::insert_job(self, job))
	}

	fn mark_job_running<'a>(&'a self, job_id: &'a str) -> BoxFuture<'a, Result<bool>> {
		Box::pin(queries::mark_job_running(self, job_id))
	}

	fn finish_job<'a>(
		&'a self,
		job_id: &'a str,
		status: JobStatus,
		error: Option<&'a str>,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(queries::finish_job(self, job_id, status.as_str(), error))
	}

	fn fetch_job<'a>(&'a self, job_id: &'a str) -> BoxFuture<'a, Result<Option<Job>>> {
		Box::pin(queries::fetch_job(self, job_id))
	}
}
impl VectorstoreCatalog for Db {
	fn create_vectorstore<'a>(
		&'a self,
		vectorstore_id: Uuid,
		created_by: Option<&'a str>,
	) -> BoxFuture<'a, Result<Vectorstore>> {
		Box::pin(queries::create_vectorstore(self, vectorstore_id, created_by))
	}

	fn fetch_vectorstore(&self, vectorstore_id: Uuid) -> BoxFuture<'_, Result<Option<Vectorstore>>> {
		Box::pin(queries::fetch_vectorstore(self, vectorstore_id))
	}

	fn upsert_file<'a>(&'a self, file: &'a NewFile<'a>) -> BoxFuture<'a, Result<VectorstoreFile>> {
		Box::pin(queries::upsert_file(self, file))
	}

	fn list_files(&self, vectorstore_id: Uuid) -> BoxFuture<'_, Result<Vec<VectorstoreFile>>> {
		Box::pin(queries::list_files(self, vectorstore_id))
	}
}
