//! Task consumption: one delivery at a time per consumer, results published and confirmed before
//! the delivery is settled.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use lxp_broker::{ResultPublisher, TaskDelivery, TaskSource};
use lxp_domain::{JobStatus, ResultMessage, SubFunction, TaskMessage};
use lxp_retrieval::{Chunker, VectorIndex};
use lxp_storage::{JobStore, VectorstoreCatalog};

use crate::{Generator, Result, handlers};

/// Everything a handler may touch. Cheap to clone.
#[derive(Clone)]
pub struct WorkerContext {
	pub jobs: Arc<dyn JobStore>,
	pub catalog: Arc<dyn VectorstoreCatalog>,
	pub index: Arc<dyn VectorIndex>,
	pub results: Arc<dyn ResultPublisher>,
	pub generator: Arc<dyn Generator>,
	pub chunker: Chunker,
	pub top_k: usize,
	pub max_points_per_file: usize,
}

/// What a handler produced: streamed text chunks followed by one result payload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Outcome {
	pub chunks: Vec<String>,
	pub result: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
	/// The job itself cannot succeed. Reported to the client as an `error` result.
	#[error("{0}")]
	Terminal(String),
	/// Infrastructure failure. The task is dead-lettered and nothing is published.
	#[error("{0}")]
	Transient(String),
}
impl From<lxp_retrieval::Error> for HandlerError {
	fn from(err: lxp_retrieval::Error) -> Self {
		Self::Transient(err.to_string())
	}
}
impl From<lxp_storage::Error> for HandlerError {
	fn from(err: lxp_storage::Error) -> Self {
		Self::Transient(err.to_string())
	}
}
impl From<crate::Error> for HandlerError {
	fn from(err: crate::Error) -> Self {
		Self::Transient(err.to_string())
	}
}

/// How a delivery was settled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
	/// Results published, job `done`, delivery acknowledged.
	Completed,
	/// `error` result published, job `error`, delivery acknowledged.
	Failed,
	/// Job was already terminal; acknowledged without running.
	Duplicate,
	/// Rejected into the dead-letter queue.
	DeadLettered,
}

/// Consumes `sub_function`'s queue until `cancel` fires or the stream ends. An in-flight task
/// always runs to completion before the loop observes cancellation.
pub async fn run_consumer(
	source: Arc<dyn TaskSource>,
	ctx: WorkerContext,
	sub_function: SubFunction,
	prefetch: u16,
	cancel: CancellationToken,
) -> Result<()> {
	let queue = sub_function.queue_name();
	let mut stream = source.consume(&queue, prefetch).await?;

	tracing::info!(queue = %queue, prefetch, "Consumer started.");

	loop {
		let next = tokio::select! {
			_ = cancel.cancelled() => break,
			next = stream.next() => next,
		};

		match next {
			Some(Ok(delivery)) => {
				process_delivery(&ctx, sub_function, delivery).await;
			},
			Some(Err(err)) => {
				tracing::error!(queue = %queue, error = %err, "Consumer stream failed.");

				return Err(err.into());
			},
			None => {
				tracing::warn!(queue = %queue, "Consumer stream closed by broker.");

				break;
			},
		}
	}

	tracing::info!(queue = %queue, "Consumer stopped.");

	Ok(())
}

pub async fn process_delivery(
	ctx: &WorkerContext,
	sub_function: SubFunction,
	delivery: Box<dyn TaskDelivery>,
) -> Disposition {
	let task = match TaskMessage::decode(delivery.body()) {
		Ok(task) => task,
		Err(err) => {
			tracing::warn!(
				routing_key = delivery.routing_key(),
				error = %err,
				"Dead-lettering undecodable task."
			);

			return dead_letter(delivery).await;
		},
	};
	let job_id = task.job_id.clone();

	if task.sub_function != sub_function {
		tracing::warn!(
			job_id = %job_id,
			expected = %sub_function,
			actual = %task.sub_function,
			"Dead-lettering task delivered to the wrong queue."
		);

		return dead_letter(delivery).await;
	}

	let job = match ctx.jobs.fetch_job(job_id.as_str()).await {
		Ok(Some(job)) => job,
		Ok(None) => {
			tracing::warn!(job_id = %job_id, "Dead-lettering task for an unknown job.");

			return dead_letter(delivery).await;
		},
		Err(err) => {
			tracing::error!(job_id = %job_id, error = %err, "Failed to load job.");

			return dead_letter(delivery).await;
		},
	};

	if job.status.parse::<JobStatus>().map(JobStatus::is_terminal).unwrap_or(false) {
		tracing::info!(
			job_id = %job_id,
			status = %job.status,
			redelivered = delivery.redelivered(),
			"Skipping task for a finished job."
		);

		return acknowledge(delivery, Disposition::Duplicate).await;
	}

	match ctx.jobs.mark_job_running(job_id.as_str()).await {
		Ok(true) => {},
		Ok(false) => {
			tracing::info!(job_id = %job_id, "Job finished concurrently. Skipping task.");

			return acknowledge(delivery, Disposition::Duplicate).await;
		},
		Err(err) => {
			tracing::error!(job_id = %job_id, error = %err, "Failed to mark job running.");

			return dead_letter(delivery).await;
		},
	}

	tracing::info!(job_id = %job_id, sub_function = %sub_function, "Running task.");

	let outcome = match tokio::spawn(handlers::run(ctx.clone(), task)).await {
		Ok(outcome) => outcome,
		Err(err) => Err(HandlerError::Transient(format!("Handler panicked: {err}"))),
	};

	match outcome {
		Ok(outcome) => {
			let mut messages = outcome
				.chunks
				.into_iter()
				.map(|chunk| ResultMessage::chunk(&job_id, chunk))
				.collect::<Vec<_>>();

			messages.push(ResultMessage::result(&job_id, outcome.result));
			messages.push(ResultMessage::end(&job_id));

			if let Err(err) = publish_all(ctx.results.as_ref(), &messages).await {
				tracing::error!(job_id = %job_id, error = %err, "Failed to publish job results.");
				finish(ctx, &job_id, JobStatus::Error, Some("Job results could not be published."))
					.await;

				return dead_letter(delivery).await;
			}

			finish(ctx, &job_id, JobStatus::Done, None).await;

			acknowledge(delivery, Disposition::Completed).await
		},
		Err(HandlerError::Terminal(reason)) => {
			tracing::warn!(job_id = %job_id, reason = %reason, "Job failed.");

			let message = ResultMessage::error(&job_id, reason.clone());

			if let Err(err) = publish_all(ctx.results.as_ref(), &[message]).await {
				tracing::error!(job_id = %job_id, error = %err, "Failed to publish job error.");
				finish(ctx, &job_id, JobStatus::Error, Some(&reason)).await;

				return dead_letter(delivery).await;
			}

			finish(ctx, &job_id, JobStatus::Error, Some(&reason)).await;

			acknowledge(delivery, Disposition::Failed).await
		},
		Err(HandlerError::Transient(reason)) => {
			tracing::error!(job_id = %job_id, reason = %reason, "Task execution failed.");

			// The client sees no result message; only the stored status records the failure.
			finish(ctx, &job_id, JobStatus::Error, Some(&reason)).await;

			dead_letter(delivery).await
		},
	}
}

async fn publish_all(results: &dyn ResultPublisher, messages: &[ResultMessage]) -> Result<()> {
	for message in messages {
		results.publish_result(message.job_id.as_str(), message.encode()?).await?;
	}

	Ok(())
}

/// Status write failures are logged only; they never change the task's disposition.
async fn finish(
	ctx: &WorkerContext,
	job_id: &lxp_domain::JobId,
	status: JobStatus,
	error: Option<&str>,
) {
	match ctx.jobs.finish_job(job_id.as_str(), status, error).await {
		Ok(true) => {},
		Ok(false) => {
			tracing::warn!(job_id = %job_id, status = %status, "Job status was not updated.");
		},
		Err(err) => {
			tracing::error!(job_id = %job_id, error = %err, "Failed to record job status.");
		},
	}
}

async fn acknowledge(delivery: Box<dyn TaskDelivery>, disposition: Disposition) -> Disposition {
	if let Err(err) = delivery.ack().await {
		tracing::error!(error = %err, "Failed to acknowledge task.");
	}

	disposition
}

async fn dead_letter(delivery: Box<dyn TaskDelivery>) -> Disposition {
	if let Err(err) = delivery.reject().await {
		tracing::error!(error = %err, "Failed to reject task.");
	}

	Disposition::DeadLettered
}
