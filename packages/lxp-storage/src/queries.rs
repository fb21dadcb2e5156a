use uuid::Uuid;

use crate::{
	Error, Result,
	db::Db,
	models::{Job, NewFile, NewJob, Vectorstore, VectorstoreFile},
};

/// Records a queued job, creating its thread on first use. A thread may only be reused by the user
/// who owns it.
pub async fn insert_job(db: &Db, job: &NewJob<'_>) -> Result<()> {
	let mut tx = db.pool.begin().await?;

	sqlx::query(
		"\
INSERT INTO threads (thread_id, user_id, function_name, title)
VALUES ($1, $2, $3, $4)
ON CONFLICT (thread_id) DO NOTHING",
	)
	.bind(job.thread_id)
	.bind(job.user_id)
	.bind(job.sub_function)
	.bind(job.thread_title)
	.execute(&mut *tx)
	.await?;

	let owner: String = sqlx::query_scalar("SELECT user_id FROM threads WHERE thread_id = $1")
		.bind(job.thread_id)
		.fetch_one(&mut *tx)
		.await?;

	if owner != job.user_id {
		return Err(Error::Conflict(format!(
			"Thread {} belongs to a different user.",
			job.thread_id
		)));
	}

	sqlx::query(
		"\
INSERT INTO jobs (job_id, thread_id, user_id, sub_function, payload, status)
VALUES ($1, $2, $3, $4, $5, 'queued')",
	)
	.bind(job.job_id)
	.bind(job.thread_id)
	.bind(job.user_id)
	.bind(job.sub_function)
	.bind(job.payload)
	.execute(&mut *tx)
	.await?;

	tx.commit().await?;

	Ok(())
}

/// Moves a job to `running`. Returns false when the job is unknown or already terminal.
pub async fn mark_job_running(db: &Db, job_id: &str) -> Result<bool> {
	let result = sqlx::query(
		"\
UPDATE jobs
SET status = 'running', updated_at = now()
WHERE job_id = $1
	AND status IN ('queued', 'running')",
	)
	.bind(job_id)
	.execute(&db.pool)
	.await?;

	Ok(result.rows_affected() == 1)
}

/// Moves a non-terminal job to `done` or `error`. Returns false when nothing changed.
pub async fn finish_job(db: &Db, job_id: &str, status: &str, error: Option<&str>) -> Result<bool> {
	if !matches!(status, "done" | "error") {
		return Err(Error::InvalidStatus(format!("{status:?} is not a terminal job status.")));
	}

	let result = sqlx::query(
		"\
UPDATE jobs
SET status = $2, error = $3, updated_at = now()
WHERE job_id = $1
	AND status IN ('queued', 'running')",
	)
	.bind(job_id)
	.bind(status)
	.bind(error)
	.execute(&db.pool)
	.await?;

	Ok(result.rows_affected() == 1)
}

pub async fn fetch_job(db: &Db, job_id: &str) -> Result<Option<Job>> {
	let job = sqlx::query_as::<_, Job>(
		"\
SELECT job_id, thread_id, user_id, sub_function, payload, status, error, created_at, updated_at
FROM jobs
WHERE job_id = $1",
	)
	.bind(job_id)
	.fetch_optional(&db.pool)
	.await?;

	Ok(job)
}

pub async fn create_vectorstore(
	db: &Db,
	vectorstore_id: Uuid,
	created_by: Option<&str>,
) -> Result<Vectorstore> {
	let store = sqlx::query_as::<_, Vectorstore>(
		"\
INSERT INTO vectorstores (vectorstore_id, created_by)
VALUES ($1, $2)
RETURNING vectorstore_id, created_by, created_at",
	)
	.bind(vectorstore_id)
	.bind(created_by)
	.fetch_one(&db.pool)
	.await?;

	Ok(store)
}

pub async fn fetch_vectorstore(db: &Db, vectorstore_id: Uuid) -> Result<Option<Vectorstore>> {
	let store = sqlx::query_as::<_, Vectorstore>(
		"SELECT vectorstore_id, created_by, created_at FROM vectorstores WHERE vectorstore_id = $1",
	)
	.bind(vectorstore_id)
	.fetch_optional(&db.pool)
	.await?;

	Ok(store)
}

/// Stores a file. Identical content in the same vectorstore keeps its original `file_id`.
pub async fn upsert_file(db: &Db, file: &NewFile<'_>) -> Result<VectorstoreFile> {
	let stored = sqlx::query_as::<_, VectorstoreFile>(
		"\
INSERT INTO vectorstore_files (file_id, vectorstore_id, filename, content_hash, body, uploaded_by)
VALUES ($1, $2, $3, $4, $5, $6)
ON CONFLICT (vectorstore_id, content_hash) DO UPDATE
SET filename = EXCLUDED.filename,
	uploaded_by = EXCLUDED.uploaded_by
RETURNING file_id, vectorstore_id, filename, content_hash, body, uploaded_by, created_at",
	)
	.bind(file.file_id)
	.bind(file.vectorstore_id)
	.bind(file.filename)
	.bind(file.content_hash)
	.bind(file.body)
	.bind(file.uploaded_by)
	.fetch_one(&db.pool)
	.await;

	match stored {
		Ok(stored) => Ok(stored),
		Err(sqlx::Error::Database(err)) if err.is_foreign_key_violation() => Err(Error::NotFound(
			format!("Vectorstore {} does not exist.", file.vectorstore_id),
		)),
		Err(err) => Err(err.into()),
	}
}

pub async fn list_files(db: &Db, vectorstore_id: Uuid) -> Result<Vec<VectorstoreFile>> {
	let files = sqlx::query_as::<_, VectorstoreFile>(
		"\
SELECT file_id, vectorstore_id, filename, content_hash, body, uploaded_by, created_at
FROM vectorstore_files
WHERE vectorstore_id = $1
ORDER BY created_at ASC, file_id ASC",
	)
	.bind(vectorstore_id)
	.fetch_all(&db.pool)
	.await?;

	Ok(files)
}
