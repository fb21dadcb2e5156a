use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use lxp_broker::TaskPublisher;
use lxp_domain::{JobId, JobRequest, JobStatus, SubFunction, TaskMessage};
use lxp_storage::{JobStore, models::NewJob};

use crate::{Error, Result};

const THREAD_TITLE_CHARS: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct JobReceipt {
	pub job_id: JobId,
	pub thread_id: Uuid,
	pub status_url: String,
}

pub fn status_url(job_id: &JobId) -> String {
	format!("/v1/events/jobs/{job_id}")
}

/// Validates, records and publishes a job. Returns as soon as the task is on the broker.
pub async fn submit_job(
	jobs: &dyn JobStore,
	tasks: &dyn TaskPublisher,
	sub_function: SubFunction,
	request: &JobRequest,
) -> Result<JobReceipt> {
	let payload = request.validate(sub_function)?;
	let job_id = JobId::mint();
	let thread_id = request.thread_id.unwrap_or_else(Uuid::new_v4);
	let title = payload
		.prompt
		.as_deref()
		.map(|prompt| prompt.chars().take(THREAD_TITLE_CHARS).collect::<String>())
		.unwrap_or_else(|| sub_function.as_str().to_string());
	let message = TaskMessage {
		job_id: job_id.clone(),
		thread_id,
		sub_function,
		payload,
		created_at: OffsetDateTime::now_utc(),
	};
	let stored_payload = serde_json::to_value(&message.payload)
		.map_err(|err| Error::invalid("payload", err.to_string()))?;
	let body = message.encode()?;

	jobs.insert_job(&NewJob {
		job_id: job_id.as_str(),
		thread_id,
		user_id: &message.payload.user_id,
		sub_function: sub_function.as_str(),
		payload: &stored_payload,
		thread_title: &title,
	})
	.await?;

	if let Err(err) = tasks.publish_task(&sub_function.routing_key(), body).await {
		tracing::error!(job_id = %job_id, error = %err, "Failed to publish task.");

		let reason = format!("Failed to publish task: {err}");

		if let Err(mark_err) = jobs.finish_job(job_id.as_str(), JobStatus::Error, Some(&reason)).await
		{
			tracing::warn!(job_id = %job_id, error = %mark_err, "Failed to mark unpublished job.");
		}

		return Err(err.into());
	}

	tracing::info!(job_id = %job_id, sub_function = %sub_function, "Job submitted.");

	Ok(JobReceipt { status_url: status_url(&job_id), job_id, thread_id })
}
