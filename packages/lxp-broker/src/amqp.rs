use futures::StreamExt;
use lapin::{
	BasicProperties, Channel, Connection, ConnectionProperties, Consumer,
	message::Delivery,
	options::{
		BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
		BasicRejectOptions, ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions,
		QueueDeclareOptions,
	},
	types::{AMQPValue, FieldTable},
};

use lxp_domain::BoxFuture;

use crate::{
	BindingSpec, BrokerAdmin, Error, ExchangeKind, ExchangeSpec, QueueSpec, Result,
	ResultPublisher, ResultSource, ResultSubscription, TaskDelivery, TaskPublisher, TaskSource,
	TaskStream,
};

const PERSISTENT: u8 = 2;

/// AMQP 0.9.1 broker over a single connection. Publishing shares one confirm-mode channel; every
/// subscription and consumer gets its own channel.
pub struct AmqpBroker {
	connection: Connection,
	publish_channel: Channel,
	tasks_exchange: String,
	results_exchange: String,
}
impl AmqpBroker {
	pub async fn connect(cfg: &lxp_config::Broker) -> Result<Self> {
		let connection = Connection::connect(&cfg.url, ConnectionProperties::default()).await?;
		let publish_channel = connection.create_channel().await?;

		publish_channel.confirm_select(ConfirmSelectOptions::default()).await?;

		tracing::info!(
			tasks_exchange = %cfg.tasks_exchange,
			results_exchange = %cfg.results_exchange,
			"Connected to broker."
		);

		Ok(Self {
			connection,
			publish_channel,
			tasks_exchange: cfg.tasks_exchange.clone(),
			results_exchange: cfg.results_exchange.clone(),
		})
	}

	pub async fn close(&self) -> Result<()> {
		self.connection.close(200, "Shutting down.").await?;

		Ok(())
	}

	async fn publish(&self, exchange: &str, routing_key: &str, body: &[u8]) -> Result<()> {
		let properties = BasicProperties::default()
			.with_delivery_mode(PERSISTENT)
			.with_content_type("application/json".into());
		let confirmation = self
			.publish_channel
			.basic_publish(exchange, routing_key, BasicPublishOptions::default(), body, properties)
			.await?
			.await?;

		if confirmation.is_nack() {
			return Err(Error::Nack {
				exchange: exchange.to_string(),
				routing_key: routing_key.to_string(),
			});
		}

		Ok(())
	}
}
impl BrokerAdmin for AmqpBroker {
	fn declare_exchange<'a>(&'a self, spec: &'a ExchangeSpec) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let kind = match spec.kind {
				ExchangeKind::Topic => lapin::ExchangeKind::Topic,
				ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
			};
			let options = ExchangeDeclareOptions { durable: true, ..Default::default() };

			self.publish_channel
				.exchange_declare(&spec.name, kind, options, FieldTable::default())
				.await?;

			Ok(())
		})
	}

	fn declare_queue<'a>(&'a self, spec: &'a QueueSpec) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut arguments = FieldTable::default();

			if let Some(exchange) = spec.dead_letter_exchange.as_deref() {
				arguments.insert(
					"x-dead-letter-exchange".into(),
					AMQPValue::LongString(exchange.into()),
				);
			}

			let options = QueueDeclareOptions { durable: true, ..Default::default() };

			self.publish_channel.queue_declare(&spec.name, options, arguments).await?;

			Ok(())
		})
	}

	fn bind_queue<'a>(&'a self, spec: &'a BindingSpec) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.publish_channel
				.queue_bind(
					&spec.queue,
					&spec.exchange,
					&spec.routing_key,
					QueueBindOptions::default(),
					FieldTable::default(),
				)
				.await?;

			Ok(())
		})
	}
}
impl TaskPublisher for AmqpBroker {
	fn publish_task<'a>(
		&'a self,
		routing_key: &'a str,
		body: Vec<u8>,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { self.publish(&self.tasks_exchange, routing_key, &body).await })
	}
}
impl ResultPublisher for AmqpBroker {
	fn publish_result<'a>(&'a self, job_id: &'a str, body: Vec<u8>) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { self.publish(&self.results_exchange, job_id, &body).await })
	}
}
impl ResultSource for AmqpBroker {
	fn subscribe<'a>(
		&'a self,
		routing_key: &'a str,
	) -> BoxFuture<'a, Result<Box<dyn ResultSubscription>>> {
		Box::pin(async move {
			let channel = self.connection.create_channel().await?;
			// Server-named, exclusive and auto-deleted: the queue disappears with its channel.
			let queue = channel
				.queue_declare(
					"",
					QueueDeclareOptions { exclusive: true, auto_delete: true, ..Default::default() },
					FieldTable::default(),
				)
				.await?;

			channel
				.queue_bind(
					queue.name().as_str(),
					&self.results_exchange,
					routing_key,
					QueueBindOptions::default(),
					FieldTable::default(),
				)
				.await?;

			let consumer = channel
				.basic_consume(
					queue.name().as_str(),
					"",
					BasicConsumeOptions { no_ack: true, exclusive: true, ..Default::default() },
					FieldTable::default(),
				)
				.await?;

			tracing::debug!(routing_key, queue = %queue.name(), "Results subscription opened.");

			Ok(Box::new(AmqpSubscription { channel: Some(channel), consumer })
				as Box<dyn ResultSubscription>)
		})
	}
}
impl TaskSource for AmqpBroker {
	fn consume<'a>(
		&'a self,
		queue: &'a str,
		prefetch: u16,
	) -> BoxFuture<'a, Result<Box<dyn TaskStream>>> {
		Box::pin(async move {
			let channel = self.connection.create_channel().await?;

			channel.basic_qos(prefetch, BasicQosOptions::default()).await?;

			let consumer = channel
				.basic_consume(queue, "", BasicConsumeOptions::default(), FieldTable::default())
				.await?;

			Ok(Box::new(AmqpTaskStream { _channel: channel, consumer }) as Box<dyn TaskStream>)
		})
	}
}

struct AmqpSubscription {
	channel: Option<Channel>,
	consumer: Consumer,
}
impl ResultSubscription for AmqpSubscription {
	fn next(&mut self) -> BoxFuture<'_, Option<Result<Vec<u8>>>> {
		Box::pin(async move {
			let delivery = self.consumer.next().await?;

			Some(delivery.map(|delivery| delivery.data).map_err(Error::from))
		})
	}

	fn unsubscribe(mut self: Box<Self>) -> BoxFuture<'static, Result<()>> {
		let channel = self.channel.take();

		Box::pin(async move {
			if let Some(channel) = channel {
				channel.close(200, "Subscription closed.").await?;
			}

			Ok(())
		})
	}
}
impl Drop for AmqpSubscription {
	fn drop(&mut self) {
		let Some(channel) = self.channel.take() else {
			return;
		};

		match tokio::runtime::Handle::try_current() {
			Ok(handle) => {
				handle.spawn(async move {
					if let Err(err) = channel.close(200, "Subscriber went away.").await {
						tracing::debug!(error = %err, "Failed to close results subscription.");
					}
				});
			},
			Err(_) => {
				tracing::debug!("No runtime available to close results subscription.");
			},
		}
	}
}

struct AmqpTaskStream {
	_channel: Channel,
	consumer: Consumer,
}
impl TaskStream for AmqpTaskStream {
	fn next(&mut self) -> BoxFuture<'_, Option<Result<Box<dyn TaskDelivery>>>> {
		Box::pin(async move {
			let delivery = self.consumer.next().await?;

			Some(
				delivery
					.map(|delivery| Box::new(AmqpDelivery { delivery }) as Box<dyn TaskDelivery>)
					.map_err(Error::from),
			)
		})
	}
}

struct AmqpDelivery {
	delivery: Delivery,
}
impl TaskDelivery for AmqpDelivery {
	fn body(&self) -> &[u8] {
		&self.delivery.data
	}

	fn routing_key(&self) -> &str {
		self.delivery.routing_key.as_str()
	}

	fn redelivered(&self) -> bool {
		self.delivery.redelivered
	}

	fn ack(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
		Box::pin(async move {
			self.delivery.acker.ack(BasicAckOptions::default()).await?;

			Ok(())
		})
	}

	fn reject(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
		Box::pin(async move {
			self.delivery.acker.reject(BasicRejectOptions { requeue: false }).await?;

			Ok(())
		})
	}
}
