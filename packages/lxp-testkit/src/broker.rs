//! In-process broker with AMQP routing semantics: topic and fanout exchanges, durable queues with
//! dead-letter exchanges, and private per-subscriber result queues.

use std::{
	collections::{BTreeMap, HashMap, VecDeque},
	sync::{Arc, Mutex, MutexGuard},
};

use tokio::sync::{Notify, mpsc};

use lxp_broker::{
	BindingSpec, BrokerAdmin, Error, ExchangeKind, ExchangeSpec, QueueSpec, Result,
	ResultPublisher, ResultSource, ResultSubscription, TaskDelivery, TaskPublisher, TaskSource,
	TaskStream, TopologyPlan, ensure_topology, topic_matches,
};
use lxp_domain::{BoxFuture, ResultMessage};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredMessage {
	pub routing_key: String,
	pub body: Vec<u8>,
	pub redelivered: bool,
}

/// Declared broker state, in declaration-independent order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopologySnapshot {
	pub exchanges: Vec<ExchangeSpec>,
	pub queues: Vec<QueueSpec>,
	pub bindings: Vec<BindingSpec>,
}

#[derive(Default)]
struct QueueState {
	dead_letter_exchange: Option<String>,
	messages: VecDeque<StoredMessage>,
	notify: Arc<Notify>,
}

struct Subscriber {
	routing_key: String,
	sender: mpsc::UnboundedSender<Vec<u8>>,
}

#[derive(Default)]
struct State {
	exchanges: BTreeMap<String, ExchangeKind>,
	queues: BTreeMap<String, QueueState>,
	bindings: Vec<BindingSpec>,
	subscribers: HashMap<u64, Subscriber>,
	next_subscriber: u64,
	results: Vec<(String, Vec<u8>)>,
	fail_task_publish: bool,
	fail_result_publish: bool,
}
impl State {
	fn route(&mut self, exchange: &str, message: StoredMessage) -> Result<()> {
		let Some(kind) = self.exchanges.get(exchange).copied() else {
			return Err(Error::Topology { message: format!("Exchange {exchange:?} is not declared.") });
		};
		let mut targets = self
			.bindings
			.iter()
			.filter(|binding| binding.exchange == exchange)
			.filter(|binding| match kind {
				ExchangeKind::Fanout => true,
				ExchangeKind::Topic => topic_matches(&binding.routing_key, &message.routing_key),
			})
			.map(|binding| binding.queue.clone())
			.collect::<Vec<_>>();

		targets.sort();
		targets.dedup();

		for target in targets {
			if let Some(queue) = self.queues.get_mut(&target) {
				queue.messages.push_back(message.clone());
				queue.notify.notify_one();
			}
		}

		Ok(())
	}
}

/// Cloning shares the same broker.
#[derive(Clone)]
pub struct MemoryBroker {
	tasks_exchange: String,
	results_exchange: String,
	state: Arc<Mutex<State>>,
}
impl MemoryBroker {
	pub fn new(cfg: &lxp_config::Broker) -> Self {
		Self {
			tasks_exchange: cfg.tasks_exchange.clone(),
			results_exchange: cfg.results_exchange.clone(),
			state: Arc::new(Mutex::new(State::default())),
		}
	}

	/// A broker with the full production topology already declared.
	pub async fn with_topology() -> Result<Self> {
		let cfg = crate::broker_config();
		let broker = Self::new(&cfg);

		ensure_topology(&broker, &TopologyPlan::from_config(&cfg)).await?;

		Ok(broker)
	}

	pub fn snapshot(&self) -> TopologySnapshot {
		let state = lock(&self.state);
		let mut bindings = state.bindings.clone();

		bindings.sort_by(|a, b| {
			(&a.exchange, &a.queue, &a.routing_key).cmp(&(&b.exchange, &b.queue, &b.routing_key))
		});

		TopologySnapshot {
			exchanges: state
				.exchanges
				.iter()
				.map(|(name, kind)| ExchangeSpec { name: name.clone(), kind: *kind })
				.collect(),
			queues: state
				.queues
				.iter()
				.map(|(name, queue)| QueueSpec {
					name: name.clone(),
					dead_letter_exchange: queue.dead_letter_exchange.clone(),
				})
				.collect(),
			bindings,
		}
	}

	/// Messages waiting in `queue`, oldest first.
	pub fn queued(&self, queue: &str) -> Vec<StoredMessage> {
		lock(&self.state)
			.queues
			.get(queue)
			.map(|queue| queue.messages.iter().cloned().collect())
			.unwrap_or_default()
	}

	/// Every result body published under `job_id`, in publish order.
	pub fn published_results(&self, job_id: &str) -> Vec<Vec<u8>> {
		lock(&self.state)
			.results
			.iter()
			.filter(|(key, _)| key == job_id)
			.map(|(_, body)| body.clone())
			.collect()
	}

	pub fn result_messages(&self, job_id: &str) -> Vec<ResultMessage> {
		self.published_results(job_id)
			.iter()
			.filter_map(|body| ResultMessage::decode(body).ok())
			.collect()
	}

	pub fn subscriber_count(&self, routing_key: &str) -> usize {
		lock(&self.state).subscribers.values().filter(|sub| sub.routing_key == routing_key).count()
	}

	/// Ends every open results subscription, as a dropped broker connection would.
	pub fn close_subscriptions(&self) {
		lock(&self.state).subscribers.clear();
	}

	pub fn fail_task_publish(&self, fail: bool) {
		lock(&self.state).fail_task_publish = fail;
	}

	pub fn fail_result_publish(&self, fail: bool) {
		lock(&self.state).fail_result_publish = fail;
	}
}
impl BrokerAdmin for MemoryBroker {
	fn declare_exchange<'a>(&'a self, spec: &'a ExchangeSpec) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut state = lock(&self.state);

			match state.exchanges.get(&spec.name) {
				Some(kind) if *kind != spec.kind => Err(Error::Topology {
					message: format!("Exchange {:?} exists with a different type.", spec.name),
				}),
				Some(_) => Ok(()),
				None => {
					state.exchanges.insert(spec.name.clone(), spec.kind);

					Ok(())
				},
			}
		})
	}

	fn declare_queue<'a>(&'a self, spec: &'a QueueSpec) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut state = lock(&self.state);

			match state.queues.get(&spec.name) {
				Some(queue) if queue.dead_letter_exchange != spec.dead_letter_exchange =>
					Err(Error::Topology {
						message: format!("Queue {:?} exists with different arguments.", spec.name),
					}),
				Some(_) => Ok(()),
				None => {
					let queue = QueueState {
						dead_letter_exchange: spec.dead_letter_exchange.clone(),
						..Default::default()
					};

					state.queues.insert(spec.name.clone(), queue);

					Ok(())
				},
			}
		})
	}

	fn bind_queue<'a>(&'a self, spec: &'a BindingSpec) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut state = lock(&self.state);

			if !state.exchanges.contains_key(&spec.exchange) || !state.queues.contains_key(&spec.queue)
			{
				return Err(Error::Topology {
					message: format!(
						"Cannot bind {:?} to {:?}; both must be declared first.",
						spec.queue, spec.exchange
					),
				});
			}
			if !state.bindings.contains(spec) {
				state.bindings.push(spec.clone());
			}

			Ok(())
		})
	}
}
impl TaskPublisher for MemoryBroker {
	fn publish_task<'a>(
		&'a self,
		routing_key: &'a str,
		body: Vec<u8>,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut state = lock(&self.state);

			if state.fail_task_publish {
				return Err(Error::Nack {
					exchange: self.tasks_exchange.clone(),
					routing_key: routing_key.to_string(),
				});
			}

			let message =
				StoredMessage { routing_key: routing_key.to_string(), body, redelivered: false };

			state.route(&self.tasks_exchange, message)
		})
	}
}
impl ResultPublisher for MemoryBroker {
	fn publish_result<'a>(&'a self, job_id: &'a str, body: Vec<u8>) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut state = lock(&self.state);

			if state.fail_result_publish {
				return Err(Error::Nack {
					exchange: self.results_exchange.clone(),
					routing_key: job_id.to_string(),
				});
			}
			if !state.exchanges.contains_key(&self.results_exchange) {
				return Err(Error::Topology {
					message: format!("Exchange {:?} is not declared.", self.results_exchange),
				});
			}

			for subscriber in state.subscribers.values() {
				if topic_matches(&subscriber.routing_key, job_id) {
					let _ = subscriber.sender.send(body.clone());
				}
			}

			state.results.push((job_id.to_string(), body));

			Ok(())
		})
	}
}
impl ResultSource for MemoryBroker {
	fn subscribe<'a>(
		&'a self,
		routing_key: &'a str,
	) -> BoxFuture<'a, Result<Box<dyn ResultSubscription>>> {
		Box::pin(async move {
			let (sender, receiver) = mpsc::unbounded_channel();
			let mut state = lock(&self.state);
			let id = state.next_subscriber;

			state.next_subscriber += 1;
			state.subscribers.insert(id, Subscriber { routing_key: routing_key.to_string(), sender });

			Ok(Box::new(MemorySubscription { id, receiver, state: Arc::clone(&self.state) })
				as Box<dyn ResultSubscription>)
		})
	}
}
impl TaskSource for MemoryBroker {
	fn consume<'a>(
		&'a self,
		queue: &'a str,
		_prefetch: u16,
	) -> BoxFuture<'a, Result<Box<dyn TaskStream>>> {
		Box::pin(async move {
			if !lock(&self.state).queues.contains_key(queue) {
				return Err(Error::Topology { message: format!("Queue {queue:?} is not declared.") });
			}

			Ok(Box::new(MemoryTaskStream { queue: queue.to_string(), state: Arc::clone(&self.state) })
				as Box<dyn TaskStream>)
		})
	}
}

struct MemorySubscription {
	id: u64,
	receiver: mpsc::UnboundedReceiver<Vec<u8>>,
	state: Arc<Mutex<State>>,
}
impl ResultSubscription for MemorySubscription {
	fn next(&mut self) -> BoxFuture<'_, Option<Result<Vec<u8>>>> {
		Box::pin(async move { self.receiver.recv().await.map(Ok) })
	}

	fn unsubscribe(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
		drop(self);

		Box::pin(async { Ok(()) })
	}
}
impl Drop for MemorySubscription {
	fn drop(&mut self) {
		lock(&self.state).subscribers.remove(&self.id);
	}
}

struct MemoryTaskStream {
	queue: String,
	state: Arc<Mutex<State>>,
}
impl TaskStream for MemoryTaskStream {
	fn next(&mut self) -> BoxFuture<'_, Option<Result<Box<dyn TaskDelivery>>>> {
		Box::pin(async move {
			loop {
				let notify = {
					let mut state = lock(&self.state);
					let Some(queue) = state.queues.get_mut(&self.queue) else {
						return Some(Err(Error::Closed));
					};

					if let Some(message) = queue.messages.pop_front() {
						let delivery = MemoryDelivery {
							queue: self.queue.clone(),
							message,
							settled: false,
							state: Arc::clone(&self.state),
						};

						return Some(Ok(Box::new(delivery) as Box<dyn TaskDelivery>));
					}

					Arc::clone(&queue.notify)
				};

				notify.notified().await;
			}
		})
	}
}

/// Unsettled deliveries go back to the head of their queue, flagged as redelivered.
struct MemoryDelivery {
	queue: String,
	message: StoredMessage,
	settled: bool,
	state: Arc<Mutex<State>>,
}
impl TaskDelivery for MemoryDelivery {
	fn body(&self) -> &[u8] {
		&self.message.body
	}

	fn routing_key(&self) -> &str {
		&self.message.routing_key
	}

	fn redelivered(&self) -> bool {
		self.message.redelivered
	}

	fn ack(mut self: Box<Self>) -> BoxFuture<'static, Result<()>> {
		self.settled = true;

		Box::pin(async { Ok(()) })
	}

	fn reject(mut self: Box<Self>) -> BoxFuture<'static, Result<()>> {
		self.settled = true;

		let mut state = lock(&self.state);
		let dead_letter_exchange =
			state.queues.get(&self.queue).and_then(|queue| queue.dead_letter_exchange.clone());
		let result = match dead_letter_exchange {
			Some(exchange) => state.route(&exchange, StoredMessage {
				routing_key: self.message.routing_key.clone(),
				body: self.message.body.clone(),
				redelivered: false,
			}),
			None => Ok(()),
		};

		drop(state);

		Box::pin(async move { result })
	}
}
impl Drop for MemoryDelivery {
	fn drop(&mut self) {
		if self.settled {
			return;
		}

		let mut state = lock(&self.state);

		if let Some(queue) = state.queues.get_mut(&self.queue) {
			let mut message = self.message.clone();

			message.redelivered = true;

			queue.messages.push_front(message);
			queue.notify.notify_one();
		}
	}
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
	state.lock().unwrap_or_else(|err| err.into_inner())
}
