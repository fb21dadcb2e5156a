use std::time::Duration;

use futures::StreamExt;
use serde_json::json;
use tokio::time;

use lxp_broker::ResultPublisher;
use lxp_domain::{JobId, ResultMessage, SubFunction};
use lxp_service::{
	BridgeOptions, Disposition,
	bridge::{CLOSED_MESSAGE, IDLE_TIMEOUT_MESSAGE},
	relay,
};
use lxp_testkit::MemoryBroker;

use super::{Harness, request};

async fn publish(broker: &MemoryBroker, message: &ResultMessage) {
	broker
		.publish_result(message.job_id.as_str(), message.encode().expect("Encode failed."))
		.await
		.expect("Publish failed.");
}

#[tokio::test]
async fn relays_events_in_order_and_closes_after_end() {
	let broker = MemoryBroker::with_topology().await.expect("Topology failed.");
	let job_id = JobId::parse("abc123").expect("Valid job id.");
	let events = relay(&broker, &job_id, BridgeOptions::default()).await.expect("Relay failed.");

	publish(&broker, &ResultMessage::chunk(&job_id, "Hello")).await;
	publish(&broker, &ResultMessage::chunk(&job_id, " world")).await;
	publish(&broker, &ResultMessage::end(&job_id)).await;

	let events = time::timeout(Duration::from_secs(5), events.collect::<Vec<_>>())
		.await
		.expect("Stream should close.");
	let observed = events.iter().map(|event| (event.name, event.body.clone())).collect::<Vec<_>>();

	assert_eq!(observed, vec![
		("chunk", json!({ "chunk": "Hello" })),
		("chunk", json!({ "chunk": " world" })),
		("end", json!({ "end": "done" })),
	]);
	assert_eq!(broker.subscriber_count("abc123"), 0);
}

#[tokio::test]
async fn error_message_is_terminal() {
	let broker = MemoryBroker::with_topology().await.expect("Topology failed.");
	let job_id = JobId::parse("job-7").expect("Valid job id.");
	let events = relay(&broker, &job_id, BridgeOptions::default()).await.expect("Relay failed.");

	publish(&broker, &ResultMessage::error(&job_id, "Vectorstore is empty.")).await;
	publish(&broker, &ResultMessage::end(&job_id)).await;

	let events = events.collect::<Vec<_>>().await;

	assert_eq!(events.len(), 1);
	assert_eq!(events[0].name, "error");
	assert_eq!(events[0].body, json!({ "error": "Vectorstore is empty." }));
}

#[tokio::test]
async fn undecodable_messages_are_skipped() {
	let broker = MemoryBroker::with_topology().await.expect("Topology failed.");
	let job_id = JobId::parse("job-8").expect("Valid job id.");
	let events = relay(&broker, &job_id, BridgeOptions::default()).await.expect("Relay failed.");

	broker.publish_result("job-8", b"not json".to_vec()).await.expect("Publish failed.");
	publish(&broker, &ResultMessage::end(&job_id)).await;

	let names = events.map(|event| event.name).collect::<Vec<_>>().await;

	assert_eq!(names, vec!["end"]);
}

#[tokio::test]
async fn dropping_the_stream_tears_down_the_subscription() {
	let broker = MemoryBroker::with_topology().await.expect("Topology failed.");
	let job_id = JobId::parse("job-9").expect("Valid job id.");
	let mut events =
		Box::pin(relay(&broker, &job_id, BridgeOptions::default()).await.expect("Relay failed."));

	publish(&broker, &ResultMessage::chunk(&job_id, "partial")).await;

	assert_eq!(events.next().await.map(|event| event.name), Some("chunk"));
	assert_eq!(broker.subscriber_count("job-9"), 1);

	drop(events);

	assert_eq!(broker.subscriber_count("job-9"), 0);
}

#[tokio::test]
async fn idle_bridge_times_out_with_an_error_event() {
	let broker = MemoryBroker::with_topology().await.expect("Topology failed.");
	let job_id = JobId::parse("slow-job").expect("Valid job id.");
	let options = BridgeOptions { idle_timeout: Some(Duration::from_millis(50)) };
	let events = relay(&broker, &job_id, options).await.expect("Relay failed.");
	let events = events.collect::<Vec<_>>().await;

	assert_eq!(events.len(), 1);
	assert_eq!(events[0].body, json!({ "error": IDLE_TIMEOUT_MESSAGE }));
	assert_eq!(broker.subscriber_count("slow-job"), 0);
}

#[tokio::test]
async fn broken_subscription_ends_with_an_error_event() {
	let broker = MemoryBroker::with_topology().await.expect("Topology failed.");
	let job_id = JobId::parse("job-10").expect("Valid job id.");
	let events = relay(&broker, &job_id, BridgeOptions::default()).await.expect("Relay failed.");

	broker.close_subscriptions();

	let events = events.collect::<Vec<_>>().await;

	assert_eq!(events.len(), 1);
	assert_eq!(events[0].body, json!({ "error": CLOSED_MESSAGE }));
}

#[tokio::test]
async fn concurrent_bridges_are_independent() {
	let broker = MemoryBroker::with_topology().await.expect("Topology failed.");
	let first = JobId::parse("first").expect("Valid job id.");
	let second = JobId::parse("second").expect("Valid job id.");
	let first_events =
		relay(&broker, &first, BridgeOptions::default()).await.expect("Relay failed.");
	let mut second_events =
		Box::pin(relay(&broker, &second, BridgeOptions::default()).await.expect("Relay failed."));

	publish(&broker, &ResultMessage::chunk(&second, "for second")).await;
	publish(&broker, &ResultMessage::end(&first)).await;

	let first_names = first_events.map(|event| event.name).collect::<Vec<_>>().await;

	assert_eq!(first_names, vec!["end"]);
	assert_eq!(broker.subscriber_count("second"), 1);
	assert_eq!(
		second_events.next().await.map(|event| event.body),
		Some(json!({ "chunk": "for second" }))
	);
}

#[tokio::test]
async fn client_sees_a_whole_job_from_intake_to_end() {
	let harness = Harness::new().await;
	let receipt = harness.submit(SubFunction::Galaxy, &request(Some("Mars. Venus."), None)).await;
	let events = relay(&harness.broker, &receipt.job_id, BridgeOptions::default())
		.await
		.expect("Relay failed.");

	assert_eq!(harness.deliver_next(SubFunction::Galaxy).await, Disposition::Completed);

	let names = events.map(|event| event.name).collect::<Vec<_>>().await;

	assert_eq!(names, vec!["chunk", "chunk", "result", "end"]);
}
