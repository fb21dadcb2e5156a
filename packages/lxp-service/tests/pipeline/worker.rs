use std::{sync::Arc, time::Duration};

use tokio::time;
use tokio_util::sync::CancellationToken;

use lxp_broker::TaskPublisher;
use lxp_domain::{BoxFuture, ResultKind, SubFunction};
use lxp_service::{Disposition, GenerationRequest, Generator, Result, run_consumer};

use super::{Harness, request};

const GUIDE: &str = "Ownership is the core idea of Rust. Every value has a single owner. \
                     Borrowing lets code use a value without taking ownership. The borrow checker \
                     enforces these rules at compile time.";

struct PanickingGenerator;
impl Generator for PanickingGenerator {
	fn generate<'a>(&'a self, request: &'a GenerationRequest<'a>) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move {
			if request.prompt.contains("boom") {
				panic!("generator exploded");
			}

			Ok(request.prompt.to_uppercase())
		})
	}
}

fn kinds(harness: &Harness, job_id: &str) -> Vec<ResultKind> {
	harness.broker.result_messages(job_id).into_iter().map(|message| message.kind).collect()
}

#[tokio::test]
async fn assist_streams_chunks_then_result_then_end() {
	let harness = Harness::new().await;
	let vectorstore_id = harness.indexed_vectorstore(&[("guide.txt", GUIDE)]).await;
	let question = request(Some("What does the borrow checker enforce?"), Some(vectorstore_id));
	let receipt = harness.submit(SubFunction::Assist, &question).await;

	assert_eq!(harness.deliver_next(SubFunction::Assist).await, Disposition::Completed);

	let messages = harness.broker.result_messages(receipt.job_id.as_str());
	let (last, rest) = messages.split_last().expect("Results should be published.");
	let (result, chunks) = rest.split_last().expect("A result should precede end.");

	assert_eq!(last.kind, ResultKind::End);
	assert_eq!(result.kind, ResultKind::Result);
	assert!(!chunks.is_empty());
	assert!(chunks.iter().all(|message| message.kind == ResultKind::Chunk));

	let streamed = chunks
		.iter()
		.map(|message| message.payload.as_str().unwrap_or_default())
		.collect::<String>();

	assert_eq!(result.payload["answer"], streamed.as_str());
	assert_eq!(result.payload["sub_function"], "assist");
	assert!(streamed.contains("borrow checker enforces these rules"));
	assert!(GUIDE.contains(chunks[0].payload.as_str().unwrap_or_default()));
	assert_eq!(result.payload["evidence"][0]["filename"], "guide.txt");
	assert_eq!(harness.status(&receipt), "done");
	assert!(harness.broker.queued("q.assist").is_empty());
}

#[tokio::test]
async fn assist_failure_dead_letters_task_unchanged() {
	let harness = Harness::new().await;
	let vectorstore_id = harness.vectorstore_with(&[("guide.txt", GUIDE)]).await;
	let receipt = harness
		.submit(SubFunction::Assist, &request(Some("What is ownership?"), Some(vectorstore_id)))
		.await;
	let original = harness.broker.queued("q.assist").remove(0);

	harness.index.set_failing(true);

	assert_eq!(harness.deliver_next(SubFunction::Assist).await, Disposition::DeadLettered);

	let dead = harness.broker.queued("q.dlq");

	assert_eq!(dead.len(), 1);
	assert_eq!(dead[0].body, original.body);
	assert_eq!(dead[0].routing_key, "assist.*");
	assert!(harness.broker.published_results(receipt.job_id.as_str()).is_empty());
	assert!(harness.broker.queued("q.assist").is_empty());
}

#[tokio::test]
async fn indexing_an_empty_vectorstore_reports_an_error() {
	let harness = Harness::new().await;
	let vectorstore_id = harness.vectorstore_with(&[]).await;
	let receipt = harness.submit(SubFunction::Index, &request(None, Some(vectorstore_id))).await;

	assert_eq!(harness.deliver_next(SubFunction::Index).await, Disposition::Failed);
	assert_eq!(kinds(&harness, receipt.job_id.as_str()), vec![ResultKind::Error]);
	assert_eq!(harness.status(&receipt), "error");
	assert!(harness.broker.queued("q.dlq").is_empty());
}

#[tokio::test]
async fn unknown_vectorstore_is_a_terminal_error() {
	let harness = Harness::new().await;
	let receipt = harness
		.submit(SubFunction::Assist, &request(Some("Anyone there?"), Some(uuid::Uuid::new_v4())))
		.await;

	assert_eq!(harness.deliver_next(SubFunction::Assist).await, Disposition::Failed);

	let messages = harness.broker.result_messages(receipt.job_id.as_str());

	assert_eq!(messages.len(), 1);
	assert!(messages[0].payload.as_str().unwrap_or_default().contains("does not exist"));
}

#[tokio::test]
async fn index_report_counts_points() {
	let harness = Harness::new().await;
	let vectorstore_id = harness.vectorstore_with(&[("guide.txt", GUIDE)]).await;
	let receipt = harness.submit(SubFunction::Index, &request(None, Some(vectorstore_id))).await;

	assert_eq!(harness.deliver_next(SubFunction::Index).await, Disposition::Completed);

	let messages = harness.broker.result_messages(receipt.job_id.as_str());
	let collection = format!("vs_{vectorstore_id}");

	assert_eq!(kinds(&harness, receipt.job_id.as_str()), vec![ResultKind::Result, ResultKind::End]);
	assert_eq!(messages[0].payload["collection"], collection.as_str());
	assert_eq!(messages[0].payload["indexed"], harness.index.point_count(&collection));
	assert_eq!(messages[0].payload["files"][0]["filename"], "guide.txt");
}

#[tokio::test]
async fn finished_job_is_not_run_twice() {
	let harness = Harness::new().await;
	let receipt = harness.submit(SubFunction::Translate, &request(Some("Hello there."), None)).await;
	let body = harness.broker.queued("q.translate")[0].body.clone();

	assert_eq!(harness.deliver_next(SubFunction::Translate).await, Disposition::Completed);

	let published = harness.broker.published_results(receipt.job_id.as_str()).len();

	harness.broker.publish_task("translate.*", body).await.expect("Republish failed.");

	assert_eq!(harness.deliver_next(SubFunction::Translate).await, Disposition::Duplicate);
	assert_eq!(harness.broker.published_results(receipt.job_id.as_str()).len(), published);
	assert!(harness.broker.queued("q.dlq").is_empty());
}

#[tokio::test]
async fn undecodable_task_is_dead_lettered() {
	let harness = Harness::new().await;

	harness.broker.publish_task("coach.*", b"{not json".to_vec()).await.expect("Publish failed.");

	assert_eq!(harness.deliver_next(SubFunction::Coach).await, Disposition::DeadLettered);
	assert_eq!(harness.broker.queued("q.dlq")[0].body, b"{not json".to_vec());
}

#[tokio::test]
async fn handler_panic_is_isolated() {
	let harness = Harness::with_generator(Arc::new(PanickingGenerator)).await;
	let exploding = harness.submit(SubFunction::Galaxy, &request(Some("boom"), None)).await;

	assert_eq!(harness.deliver_next(SubFunction::Galaxy).await, Disposition::DeadLettered);
	assert!(harness.broker.published_results(exploding.job_id.as_str()).is_empty());
	assert_eq!(harness.status(&exploding), "error");

	let stored = harness.jobs.job(exploding.job_id.as_str()).expect("Job should exist.");

	assert!(stored.error.expect("Error should be recorded.").starts_with("Handler panicked"));

	let calm = harness.submit(SubFunction::Galaxy, &request(Some("stars."), None)).await;

	assert_eq!(harness.deliver_next(SubFunction::Galaxy).await, Disposition::Completed);

	let messages = harness.broker.result_messages(calm.job_id.as_str());

	assert_eq!(messages[0].payload, "STARS.");
	assert_eq!(messages[1].payload["text"], "STARS.");
}

#[tokio::test]
async fn result_publish_failure_dead_letters_task() {
	let harness = Harness::new().await;
	let receipt = harness.submit(SubFunction::Coach, &request(Some("Teach me."), None)).await;

	harness.broker.fail_result_publish(true);

	assert_eq!(harness.deliver_next(SubFunction::Coach).await, Disposition::DeadLettered);
	assert_eq!(harness.broker.queued("q.dlq").len(), 1);
	assert_eq!(harness.status(&receipt), "error");
}

#[tokio::test]
async fn generated_text_streams_as_sentences() {
	let harness = Harness::new().await;
	let receipt = harness
		.submit(SubFunction::Translate, &request(Some("First line. Second line."), None))
		.await;

	assert_eq!(harness.deliver_next(SubFunction::Translate).await, Disposition::Completed);

	let messages = harness.broker.result_messages(receipt.job_id.as_str());

	assert_eq!(kinds(&harness, receipt.job_id.as_str()), vec![
		ResultKind::Chunk,
		ResultKind::Chunk,
		ResultKind::Result,
		ResultKind::End
	]);
	assert_eq!(messages[0].payload, "First line. ");
	assert_eq!(messages[1].payload, "Second line.");
	assert_eq!(messages[2].payload["text"], "First line. Second line.");
}

#[tokio::test]
async fn consumer_runs_until_cancelled() {
	let harness = Harness::new().await;
	let cancel = CancellationToken::new();
	let consumer = tokio::spawn(run_consumer(
		Arc::new(harness.broker.clone()),
		harness.ctx.clone(),
		SubFunction::Coach,
		4,
		cancel.clone(),
	));
	let receipt = harness.submit(SubFunction::Coach, &request(Some("Plan my study."), None)).await;

	time::timeout(Duration::from_secs(5), async {
		while harness.status(&receipt) != "done" {
			time::sleep(Duration::from_millis(10)).await;
		}
	})
	.await
	.expect("Job should complete.");

	cancel.cancel();

	let joined = time::timeout(Duration::from_secs(5), consumer).await.expect("Consumer should stop.");

	assert!(matches!(joined, Ok(Ok(()))));
}
