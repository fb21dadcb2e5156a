use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use lxp_domain::{JobId, JobStatus, SubFunction};
use lxp_storage::JobStore;

use crate::{Error, Result};

#[derive(Clone, Debug, Serialize)]
pub struct JobView {
	pub job_id: JobId,
	pub thread_id: Uuid,
	pub sub_function: SubFunction,
	pub status: JobStatus,
	pub error: Option<String>,
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
	#[serde(with = "time::serde::rfc3339")]
	pub updated_at: OffsetDateTime,
}

pub async fn get_job(jobs: &dyn JobStore, job_id: &JobId) -> Result<JobView> {
	let Some(job) = jobs.fetch_job(job_id.as_str()).await? else {
		return Err(Error::NotFound { message: format!("Job {job_id} does not exist.") });
	};

	Ok(JobView {
		job_id: job_id.clone(),
		thread_id: job.thread_id,
		sub_function: job.sub_function.parse()?,
		status: job.status.parse()?,
		error: job.error,
		created_at: job.created_at,
		updated_at: job.updated_at,
	})
}
