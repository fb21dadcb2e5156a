use lxp_broker::{
	BrokerAdmin, Error, ExchangeKind, ExchangeSpec, QueueSpec, TaskPublisher, TaskSource,
	TopologyPlan, ensure_topology,
};
use lxp_domain::SubFunction;
use lxp_testkit::MemoryBroker;

#[tokio::test]
async fn ensuring_topology_twice_is_a_no_op() {
	let cfg = lxp_testkit::broker_config();
	let broker = MemoryBroker::new(&cfg);
	let plan = TopologyPlan::from_config(&cfg);

	ensure_topology(&broker, &plan).await.expect("First declaration failed.");

	let first = broker.snapshot();

	ensure_topology(&broker, &plan).await.expect("Second declaration failed.");

	assert_eq!(broker.snapshot(), first);
	assert_eq!(first.exchanges.len(), 3);
	assert_eq!(first.queues.len(), SubFunction::ALL.len() + 1);
	assert_eq!(first.bindings.len(), SubFunction::ALL.len() + 1);
}

#[tokio::test]
async fn conflicting_declaration_is_rejected() {
	let broker = MemoryBroker::with_topology().await.expect("Topology failed.");
	let exchange = ExchangeSpec { name: "ai.tasks".to_string(), kind: ExchangeKind::Fanout };
	let queue = QueueSpec { name: "q.assist".to_string(), dead_letter_exchange: None };

	assert!(matches!(broker.declare_exchange(&exchange).await, Err(Error::Topology { .. })));
	assert!(matches!(broker.declare_queue(&queue).await, Err(Error::Topology { .. })));
}

#[tokio::test]
async fn tasks_route_to_their_sub_function_queue() {
	let broker = MemoryBroker::with_topology().await.expect("Topology failed.");

	for sub in SubFunction::ALL {
		broker
			.publish_task(&sub.routing_key(), sub.as_str().as_bytes().to_vec())
			.await
			.expect("Publish failed.");
	}

	for sub in SubFunction::ALL {
		let queued = broker.queued(&sub.queue_name());

		assert_eq!(queued.len(), 1, "queue {}", sub.queue_name());
		assert_eq!(queued[0].body, sub.as_str().as_bytes());
	}
}

#[tokio::test]
async fn rejected_task_reaches_the_dead_letter_queue_unchanged() {
	let broker = MemoryBroker::with_topology().await.expect("Topology failed.");
	let body = br#"{"job_id":"abc123"}"#.to_vec();

	broker.publish_task("translate.*", body.clone()).await.expect("Publish failed.");

	let mut stream = broker.consume("q.translate", 1).await.expect("Consume failed.");
	let delivery = stream.next().await.expect("Stream closed.").expect("Delivery failed.");

	assert_eq!(delivery.routing_key(), "translate.*");
	assert!(!delivery.redelivered());

	delivery.reject().await.expect("Reject failed.");

	let dead = broker.queued("q.dlq");

	assert_eq!(dead.len(), 1);
	assert_eq!(dead[0].body, body);
	assert_eq!(dead[0].routing_key, "translate.*");
	assert!(broker.queued("q.translate").is_empty());
}

#[tokio::test]
async fn unsettled_delivery_is_redelivered() {
	let broker = MemoryBroker::with_topology().await.expect("Topology failed.");

	broker.publish_task("coach.*", b"task".to_vec()).await.expect("Publish failed.");

	let mut stream = broker.consume("q.coach", 1).await.expect("Consume failed.");
	let delivery = stream.next().await.expect("Stream closed.").expect("Delivery failed.");

	drop(delivery);

	let delivery = stream.next().await.expect("Stream closed.").expect("Delivery failed.");

	assert!(delivery.redelivered());
	assert_eq!(delivery.body(), b"task");

	delivery.ack().await.expect("Ack failed.");

	assert!(broker.queued("q.coach").is_empty());
	assert!(broker.queued("q.dlq").is_empty());
}
