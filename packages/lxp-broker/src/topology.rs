use lxp_config::Broker;
use lxp_domain::SubFunction;

use crate::{BrokerAdmin, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExchangeKind {
	Topic,
	Fanout,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExchangeSpec {
	pub name: String,
	pub kind: ExchangeKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueSpec {
	pub name: String,
	pub dead_letter_exchange: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindingSpec {
	pub queue: String,
	pub exchange: String,
	pub routing_key: String,
}

/// Durable broker layout: tasks and results topic exchanges, one queue per sub-function and a
/// fanout dead-letter exchange fed by every task queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopologyPlan {
	pub exchanges: Vec<ExchangeSpec>,
	pub queues: Vec<QueueSpec>,
	pub bindings: Vec<BindingSpec>,
}
impl TopologyPlan {
	pub fn from_config(cfg: &Broker) -> Self {
		let exchanges = vec![
			ExchangeSpec { name: cfg.tasks_exchange.clone(), kind: ExchangeKind::Topic },
			ExchangeSpec { name: cfg.results_exchange.clone(), kind: ExchangeKind::Topic },
			ExchangeSpec { name: cfg.dead_letter_exchange.clone(), kind: ExchangeKind::Fanout },
		];
		let mut queues = Vec::with_capacity(SubFunction::ALL.len() + 1);
		let mut bindings = Vec::with_capacity(SubFunction::ALL.len() + 1);

		for sub in SubFunction::ALL {
			queues.push(QueueSpec {
				name: sub.queue_name(),
				dead_letter_exchange: Some(cfg.dead_letter_exchange.clone()),
			});
			bindings.push(BindingSpec {
				queue: sub.queue_name(),
				exchange: cfg.tasks_exchange.clone(),
				routing_key: sub.binding_key(),
			});
		}

		queues.push(QueueSpec { name: cfg.dead_letter_queue.clone(), dead_letter_exchange: None });
		bindings.push(BindingSpec {
			queue: cfg.dead_letter_queue.clone(),
			exchange: cfg.dead_letter_exchange.clone(),
			routing_key: String::new(),
		});

		Self { exchanges, queues, bindings }
	}
}

/// Declares every exchange, queue and binding in `plan`. Declarations are idempotent, so this is
/// safe to run on every process start.
pub async fn ensure_topology<A>(admin: &A, plan: &TopologyPlan) -> Result<()>
where
	A: BrokerAdmin + ?Sized,
{
	for exchange in &plan.exchanges {
		admin.declare_exchange(exchange).await?;
	}
	for queue in &plan.queues {
		admin.declare_queue(queue).await?;
	}
	for binding in &plan.bindings {
		admin.bind_queue(binding).await?;
	}

	tracing::info!(
		exchanges = plan.exchanges.len(),
		queues = plan.queues.len(),
		bindings = plan.bindings.len(),
		"Broker topology ensured."
	);

	Ok(())
}

/// AMQP topic matching: `*` matches exactly one word and `#` matches zero or more.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
	let pattern = pattern.split('.').collect::<Vec<_>>();
	let key = if routing_key.is_empty() { Vec::new() } else { routing_key.split('.').collect() };

	match_words(&pattern, &key)
}

fn match_words(pattern: &[&str], key: &[&str]) -> bool {
	match pattern.split_first() {
		None => key.is_empty(),
		Some((&"#", rest)) => (0..=key.len()).any(|skip| match_words(rest, &key[skip..])),
		Some((&"*", rest)) => !key.is_empty() && match_words(rest, &key[1..]),
		Some((word, rest)) => key.first() == Some(word) && match_words(rest, &key[1..]),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn broker() -> Broker {
		Broker {
			url: "amqp://localhost".to_string(),
			tasks_exchange: "ai.tasks".to_string(),
			results_exchange: "ai.results".to_string(),
			dead_letter_exchange: "ai.dlq".to_string(),
			dead_letter_queue: "q.dlq".to_string(),
			prefetch: 8,
		}
	}

	#[test]
	fn plan_wires_every_task_queue_to_the_dead_letter_exchange() {
		let plan = TopologyPlan::from_config(&broker());

		assert_eq!(plan.exchanges.len(), 3);
		assert_eq!(plan.queues.len(), SubFunction::ALL.len() + 1);

		for sub in SubFunction::ALL {
			let queue = plan
				.queues
				.iter()
				.find(|q| q.name == sub.queue_name())
				.expect("Queue should exist.");

			assert_eq!(queue.dead_letter_exchange.as_deref(), Some("ai.dlq"));
			assert!(plan.bindings.iter().any(|b| {
				b.queue == sub.queue_name()
					&& b.exchange == "ai.tasks"
					&& b.routing_key == sub.binding_key()
			}));
		}

		assert!(plan.bindings.iter().any(|b| b.queue == "q.dlq" && b.exchange == "ai.dlq"));
	}

	#[test]
	fn topic_wildcards() {
		assert!(topic_matches("assist.*", "assist.*"));
		assert!(topic_matches("assist.*", "assist.v1"));
		assert!(!topic_matches("assist.*", "assist"));
		assert!(!topic_matches("assist.*", "translate.v1"));
		assert!(topic_matches("#", "anything.at.all"));
		assert!(topic_matches("#", ""));
		assert!(topic_matches("a.#.z", "a.z"));
		assert!(topic_matches("a.#.z", "a.b.c.z"));
		assert!(topic_matches("abc123", "abc123"));
		assert!(!topic_matches("abc123", "abc1234"));
	}
}
