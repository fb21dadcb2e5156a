use std::{
	collections::HashMap,
	sync::{Mutex, MutexGuard},
};

use time::OffsetDateTime;
use uuid::Uuid;

use lxp_domain::{BoxFuture, JobStatus};
use lxp_storage::{
	Error, JobStore, Result, VectorstoreCatalog,
	models::{Job, NewFile, NewJob, Vectorstore, VectorstoreFile},
};

#[derive(Default)]
struct Jobs {
	jobs: HashMap<String, Job>,
	thread_owners: HashMap<Uuid, String>,
}

/// Job and thread records with the same transition rules as the Postgres queries.
#[derive(Default)]
pub struct MemoryJobStore {
	inner: Mutex<Jobs>,
}
impl MemoryJobStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn job(&self, job_id: &str) -> Option<Job> {
		self.lock().jobs.get(job_id).cloned()
	}

	pub fn all(&self) -> Vec<Job> {
		let mut jobs = self.lock().jobs.values().cloned().collect::<Vec<_>>();

		jobs.sort_by_key(|job| job.created_at);

		jobs
	}

	pub fn len(&self) -> usize {
		self.lock().jobs.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn lock(&self) -> MutexGuard<'_, Jobs> {
		self.inner.lock().unwrap_or_else(|err| err.into_inner())
	}
}
impl JobStore for MemoryJobStore {
	fn insert_job<'a>(&'a self, job: &'a NewJob<'a>) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut inner = self.lock();
			let owner = inner
				.thread_owners
				.entry(job.thread_id)
				.or_insert_with(|| job.user_id.to_string());

			if owner.as_str() != job.user_id {
				return Err(Error::Conflict(format!(
					"Thread {} belongs to a different user.",
					job.thread_id
				)));
			}
			if inner.jobs.contains_key(job.job_id) {
				return Err(Error::Conflict(format!("Job {} already exists.", job.job_id)));
			}

			let now = OffsetDateTime::now_utc();

			inner.jobs.insert(job.job_id.to_string(), Job {
				job_id: job.job_id.to_string(),
				thread_id: job.thread_id,
				user_id: job.user_id.to_string(),
				sub_function: job.sub_function.to_string(),
				payload: job.payload.clone(),
				status: JobStatus::Queued.as_str().to_string(),
				error: None,
				created_at: now,
				updated_at: now,
			});

			Ok(())
		})
	}

	fn mark_job_running<'a>(&'a self, job_id: &'a str) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move { Ok(transition(&mut self.lock(), job_id, JobStatus::Running, None)) })
	}

	fn finish_job<'a>(
		&'a self,
		job_id: &'a str,
		status: JobStatus,
		error: Option<&'a str>,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			if !status.is_terminal() {
				return Err(Error::InvalidStatus(format!(
					"{:?} is not a terminal job status.",
					status.as_str()
				)));
			}

			Ok(transition(&mut self.lock(), job_id, status, error))
		})
	}

	fn fetch_job<'a>(&'a self, job_id: &'a str) -> BoxFuture<'a, Result<Option<Job>>> {
		Box::pin(async move { Ok(self.job(job_id)) })
	}
}

fn transition(inner: &mut Jobs, job_id: &str, next: JobStatus, error: Option<&str>) -> bool {
	let Some(job) = inner.jobs.get_mut(job_id) else {
		return false;
	};
	let Ok(current) = job.status.parse::<JobStatus>() else {
		return false;
	};

	if !current.can_transition_to(next) {
		return false;
	}

	job.status = next.as_str().to_string();
	job.error = error.map(str::to_string);
	job.updated_at = OffsetDateTime::now_utc();

	true
}

#[derive(Default)]
struct Catalog {
	stores: HashMap<Uuid, Vectorstore>,
	files: Vec<VectorstoreFile>,
}

#[derive(Default)]
pub struct MemoryCatalog {
	inner: Mutex<Catalog>,
}
impl MemoryCatalog {
	pub fn new() -> Self {
		Self::default()
	}

	fn lock(&self) -> MutexGuard<'_, Catalog> {
		self.inner.lock().unwrap_or_else(|err| err.into_inner())
	}
}
impl VectorstoreCatalog for MemoryCatalog {
	fn create_vectorstore<'a>(
		&'a self,
		vectorstore_id: Uuid,
		created_by: Option<&'a str>,
	) -> BoxFuture<'a, Result<Vectorstore>> {
		Box::pin(async move {
			let mut inner = self.lock();

			if inner.stores.contains_key(&vectorstore_id) {
				return Err(Error::Conflict(format!("Vectorstore {vectorstore_id} already exists.")));
			}

			let store = Vectorstore {
				vectorstore_id,
				created_by: created_by.map(str::to_string),
				created_at: OffsetDateTime::now_utc(),
			};

			inner.stores.insert(vectorstore_id, store.clone());

			Ok(store)
		})
	}

	fn fetch_vectorstore(&self, vectorstore_id: Uuid) -> BoxFuture<'_, Result<Option<Vectorstore>>> {
		Box::pin(async move { Ok(self.lock().stores.get(&vectorstore_id).cloned()) })
	}

	fn upsert_file<'a>(&'a self, file: &'a NewFile<'a>) -> BoxFuture<'a, Result<VectorstoreFile>> {
		Box::pin(async move {
			let mut inner = self.lock();

			if !inner.stores.contains_key(&file.vectorstore_id) {
				return Err(Error::NotFound(format!(
					"Vectorstore {} does not exist.",
					file.vectorstore_id
				)));
			}
			if let Some(existing) = inner.files.iter_mut().find(|existing| {
				existing.vectorstore_id == file.vectorstore_id
					&& existing.content_hash == file.content_hash
			}) {
				existing.filename = file.filename.to_string();
				existing.uploaded_by = file.uploaded_by.map(str::to_string);

				return Ok(existing.clone());
			}

			let stored = VectorstoreFile {
				file_id: file.file_id,
				vectorstore_id: file.vectorstore_id,
				filename: file.filename.to_string(),
				content_hash: file.content_hash.to_string(),
				body: file.body.to_string(),
				uploaded_by: file.uploaded_by.map(str::to_string),
				created_at: OffsetDateTime::now_utc(),
			};

			inner.files.push(stored.clone());

			Ok(stored)
		})
	}

	fn list_files(&self, vectorstore_id: Uuid) -> BoxFuture<'_, Result<Vec<VectorstoreFile>>> {
		Box::pin(async move {
			Ok(self
				.lock()
				.files
				.iter()
				.filter(|file| file.vectorstore_id == vectorstore_id)
				.cloned()
				.collect())
		})
	}
}
