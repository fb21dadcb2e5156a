//! Broker capabilities used by job intake, workers and the event bridge.
//!
//! Everything above this crate talks to the traits defined here, so the orchestration logic runs
//! unchanged against AMQP or an in-memory broker.

pub mod amqp;
pub mod topology;

mod error;

pub use error::{Error, Result};
pub use topology::{
	BindingSpec, ExchangeKind, ExchangeSpec, QueueSpec, TopologyPlan, ensure_topology,
	topic_matches,
};

use lxp_domain::BoxFuture;

pub trait BrokerAdmin
where
	Self: Send + Sync,
{
	fn declare_exchange<'a>(&'a self, spec: &'a ExchangeSpec) -> BoxFuture<'a, Result<()>>;

	fn declare_queue<'a>(&'a self, spec: &'a QueueSpec) -> BoxFuture<'a, Result<()>>;

	fn bind_queue<'a>(&'a self, spec: &'a BindingSpec) -> BoxFuture<'a, Result<()>>;
}

/// Publishes persistent task messages to the tasks exchange.
pub trait TaskPublisher
where
	Self: Send + Sync,
{
	fn publish_task<'a>(&'a self, routing_key: &'a str, body: Vec<u8>)
	-> BoxFuture<'a, Result<()>>;
}

/// Publishes result messages to the results exchange under the job id. Resolves once the broker
/// has confirmed the message.
pub trait ResultPublisher
where
	Self: Send + Sync,
{
	fn publish_result<'a>(&'a self, job_id: &'a str, body: Vec<u8>) -> BoxFuture<'a, Result<()>>;
}

pub trait ResultSource
where
	Self: Send + Sync,
{
	/// Opens a private subscription on the results exchange bound with exactly `routing_key`.
	fn subscribe<'a>(
		&'a self,
		routing_key: &'a str,
	) -> BoxFuture<'a, Result<Box<dyn ResultSubscription>>>;
}

/// A live results subscription. Dropping it tears the subscription down as well.
pub trait ResultSubscription
where
	Self: Send,
{
	/// Next message body, or `None` once the subscription has closed.
	fn next(&mut self) -> BoxFuture<'_, Option<Result<Vec<u8>>>>;

	fn unsubscribe(self: Box<Self>) -> BoxFuture<'static, Result<()>>;
}

pub trait TaskSource
where
	Self: Send + Sync,
{
	/// Starts consuming `queue` with at most `prefetch` unacknowledged deliveries.
	fn consume<'a>(
		&'a self,
		queue: &'a str,
		prefetch: u16,
	) -> BoxFuture<'a, Result<Box<dyn TaskStream>>>;
}

pub trait TaskStream
where
	Self: Send,
{
	fn next(&mut self) -> BoxFuture<'_, Option<Result<Box<dyn TaskDelivery>>>>;
}

pub trait TaskDelivery
where
	Self: Send + Sync,
{
	fn body(&self) -> &[u8];

	fn routing_key(&self) -> &str;

	fn redelivered(&self) -> bool;

	fn ack(self: Box<Self>) -> BoxFuture<'static, Result<()>>;

	/// Rejects without requeueing; the queue's dead-letter exchange receives the message.
	fn reject(self: Box<Self>) -> BoxFuture<'static, Result<()>>;
}
