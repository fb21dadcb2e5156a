//! Relays result messages for one job to a push-event consumer.

use std::time::Duration;

use futures::{Stream, stream};
use serde_json::Value;
use tokio::time;

use lxp_broker::{ResultSource, ResultSubscription};
use lxp_domain::{JobId, ResultKind, ResultMessage};

use crate::Result;

pub const IDLE_TIMEOUT_MESSAGE: &str = "Timed out waiting for job events.";
pub const CLOSED_MESSAGE: &str = "Job event stream closed unexpectedly.";

#[derive(Clone, Copy, Debug, Default)]
pub struct BridgeOptions {
	/// Longest wait for the next message. `None` waits indefinitely.
	pub idle_timeout: Option<Duration>,
}
impl BridgeOptions {
	pub fn from_config(cfg: &lxp_config::Bridge) -> Self {
		let idle_timeout =
			(cfg.idle_timeout_secs > 0).then(|| Duration::from_secs(cfg.idle_timeout_secs));

		Self { idle_timeout }
	}
}

/// One push event: named after the result type, carrying `{<type>: payload}`.
#[derive(Clone, Debug, PartialEq)]
pub struct BridgeEvent {
	pub name: &'static str,
	pub body: Value,
}
impl BridgeEvent {
	fn error(message: &str) -> Self {
		Self {
			name: ResultKind::Error.as_str(),
			body: serde_json::json!({ "error": message }),
		}
	}
}
impl From<&ResultMessage> for BridgeEvent {
	fn from(message: &ResultMessage) -> Self {
		Self { name: message.kind.as_str(), body: message.event_body() }
	}
}

enum Relay {
	Open { subscription: Box<dyn ResultSubscription>, job_id: JobId, options: BridgeOptions },
	Finished,
}

/// Subscribes to `job_id` and returns the event stream. The subscription is open before this
/// returns, so no message published afterwards is missed. Dropping the stream tears the
/// subscription down.
pub async fn relay(
	source: &dyn ResultSource,
	job_id: &JobId,
	options: BridgeOptions,
) -> Result<impl Stream<Item = BridgeEvent> + Send + use<>> {
	let subscription = source.subscribe(job_id.as_str()).await?;

	tracing::debug!(job_id = %job_id, "Event bridge subscribed.");

	let state = Relay::Open { subscription, job_id: job_id.clone(), options };

	Ok(stream::unfold(state, |state| async move {
		let Relay::Open { mut subscription, job_id, options } = state else {
			return None;
		};

		loop {
			let waited = match options.idle_timeout {
				Some(limit) => time::timeout(limit, subscription.next()).await.ok(),
				None => Some(subscription.next().await),
			};
			let Some(next) = waited else {
				tracing::warn!(job_id = %job_id, "Event bridge timed out waiting for results.");
				close(subscription, &job_id).await;

				return Some((BridgeEvent::error(IDLE_TIMEOUT_MESSAGE), Relay::Finished));
			};
			let body = match next {
				Some(Ok(body)) => body,
				Some(Err(err)) => {
					tracing::warn!(
						job_id = %job_id,
						error = %err,
						"Event bridge subscription failed."
					);
					close(subscription, &job_id).await;

					return Some((BridgeEvent::error(CLOSED_MESSAGE), Relay::Finished));
				},
				None => {
					tracing::warn!(job_id = %job_id, "Event bridge subscription ended early.");

					return Some((BridgeEvent::error(CLOSED_MESSAGE), Relay::Finished));
				},
			};
			let message = match ResultMessage::decode(&body) {
				Ok(message) => message,
				Err(err) => {
					tracing::warn!(
						job_id = %job_id,
						error = %err,
						"Skipping undecodable result message."
					);

					continue;
				},
			};

			if message.job_id != job_id {
				tracing::warn!(
					job_id = %job_id,
					other_job_id = %message.job_id,
					"Skipping result message for another job."
				);

				continue;
			}

			let event = BridgeEvent::from(&message);

			if message.is_terminal() {
				close(subscription, &job_id).await;

				return Some((event, Relay::Finished));
			}

			return Some((event, Relay::Open { subscription, job_id, options }));
		}
	}))
}

async fn close(subscription: Box<dyn ResultSubscription>, job_id: &JobId) {
	if let Err(err) = subscription.unsubscribe().await {
		tracing::debug!(
			job_id = %job_id,
			error = %err,
			"Failed to close event bridge subscription."
		);
	}
}
