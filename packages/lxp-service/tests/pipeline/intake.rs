use uuid::Uuid;

use lxp_domain::{SubFunction, TaskMessage};
use lxp_service::{Error, submit_job};

use super::{Harness, request};

#[tokio::test]
async fn submission_records_queued_job_and_publishes_task() {
	let harness = Harness::new().await;
	let vectorstore_id = Uuid::new_v4();
	let receipt = harness
		.submit(SubFunction::Assist, &request(Some("What is Rust?"), Some(vectorstore_id)))
		.await;

	assert_eq!(receipt.status_url, format!("/v1/events/jobs/{}", receipt.job_id));
	assert_eq!(harness.status(&receipt), "queued");

	let queued = harness.broker.queued("q.assist");

	assert_eq!(queued.len(), 1);
	assert_eq!(queued[0].routing_key, "assist.*");

	let task = TaskMessage::decode(&queued[0].body).expect("Task should decode.");

	assert_eq!(task.job_id, receipt.job_id);
	assert_eq!(task.thread_id, receipt.thread_id);
	assert_eq!(task.payload.vectorstore_id, Some(vectorstore_id));
	assert!(harness.broker.queued("q.translate").is_empty());
}

#[tokio::test]
async fn invalid_payload_creates_nothing() {
	let harness = Harness::new().await;
	let result = submit_job(
		harness.jobs.as_ref(),
		&harness.broker,
		SubFunction::Assist,
		&request(Some("Where is my vectorstore?"), None),
	)
	.await;

	assert!(matches!(
		result,
		Err(Error::InvalidRequest { ref field, .. }) if field == "vectorstore_id"
	));
	assert!(harness.jobs.is_empty());
	assert!(harness.broker.queued("q.assist").is_empty());
}

#[tokio::test]
async fn publish_failure_marks_job_error() {
	let harness = Harness::new().await;

	harness.broker.fail_task_publish(true);

	let result = submit_job(
		harness.jobs.as_ref(),
		&harness.broker,
		SubFunction::Translate,
		&request(Some("Bonjour"), None),
	)
	.await;

	assert!(matches!(result, Err(Error::Broker { .. })));

	let jobs = harness.jobs.all();

	assert_eq!(jobs.len(), 1);
	assert_eq!(jobs[0].status, "error");
	assert!(jobs[0].error.as_deref().unwrap_or_default().contains("publish"));
	assert!(harness.broker.queued("q.translate").is_empty());
}

#[tokio::test]
async fn thread_belongs_to_its_first_user() {
	let harness = Harness::new().await;
	let first = harness.submit(SubFunction::Coach, &request(Some("Plan my week."), None)).await;
	let mut other = request(Some("Me too."), None);

	other.user_id = "user-2".to_string();
	other.thread_id = Some(first.thread_id);

	let result =
		submit_job(harness.jobs.as_ref(), &harness.broker, SubFunction::Coach, &other).await;

	assert!(matches!(result, Err(Error::Conflict { .. })));

	let mut same_user = request(Some("And next week?"), None);

	same_user.thread_id = Some(first.thread_id);

	let second = harness.submit(SubFunction::Coach, &same_user).await;

	assert_eq!(second.thread_id, first.thread_id);
	assert_ne!(second.job_id, first.job_id);
}
