use std::{future::Future, sync::Arc};

use color_eyre::eyre;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use lxp_broker::TaskSource;
use lxp_domain::SubFunction;
use lxp_service::{WorkerContext, run_consumer};

pub type ConsumerExit = (SubFunction, lxp_service::Result<()>);

/// Configured sub-functions in queue order, or every sub-function when none are listed.
pub fn selected_sub_functions(cfg: &lxp_config::Worker) -> lxp_domain::Result<Vec<SubFunction>> {
	if cfg.sub_functions.is_empty() {
		return Ok(SubFunction::ALL.to_vec());
	}

	cfg.sub_functions.iter().map(|name| name.parse()).collect()
}

/// Starts `per_queue` consumers for each sub-function. All of them stop once `cancel` fires.
pub fn spawn_consumers(
	source: Arc<dyn TaskSource>,
	ctx: WorkerContext,
	sub_functions: &[SubFunction],
	per_queue: u32,
	prefetch: u16,
	cancel: &CancellationToken,
) -> JoinSet<ConsumerExit> {
	let mut consumers = JoinSet::new();

	for &sub_function in sub_functions {
		for _ in 0..per_queue {
			let source = Arc::clone(&source);
			let ctx = ctx.clone();
			let cancel = cancel.clone();

			consumers.spawn(async move {
				(sub_function, run_consumer(source, ctx, sub_function, prefetch, cancel).await)
			});
		}
	}

	tracing::info!(
		sub_functions = sub_functions.len(),
		per_queue,
		consumers = consumers.len(),
		"Consumers started."
	);

	consumers
}

/// Waits for `shutdown` or the first consumer to stop on its own, then cancels and drains the
/// rest. A consumer that stops before shutdown is reported as the error.
pub async fn supervise<F>(
	mut consumers: JoinSet<ConsumerExit>,
	cancel: CancellationToken,
	shutdown: F,
) -> color_eyre::Result<()>
where
	F: Future<Output = ()>,
{
	let mut failure = None;

	tokio::pin!(shutdown);

	loop {
		tokio::select! {
			_ = &mut shutdown, if !cancel.is_cancelled() => {
				tracing::info!("Stopping consumers.");
				cancel.cancel();
			},
			joined = consumers.join_next() => {
				let Some(joined) = joined else {
					break;
				};
				let stopping = cancel.is_cancelled();

				match joined {
					Ok((_, Ok(()))) if stopping => {},
					Ok((sub_function, Ok(()))) => {
						tracing::error!(sub_function = %sub_function, "Consumer stopped unexpectedly.");
						failure.get_or_insert_with(|| {
							eyre::eyre!("Consumer for {sub_function} stopped unexpectedly.")
						});
					},
					Ok((sub_function, Err(err))) => {
						tracing::error!(sub_function = %sub_function, error = %err, "Consumer failed.");
						failure.get_or_insert_with(|| {
							eyre::eyre!("Consumer for {sub_function} failed: {err}")
						});
					},
					Err(err) => {
						tracing::error!(error = %err, "Consumer task aborted.");
						failure.get_or_insert_with(|| eyre::eyre!("Consumer task aborted: {err}"));
					},
				}

				cancel.cancel();
			},
		}
	}

	tracing::info!("All consumers stopped.");

	match failure {
		Some(err) => Err(err),
		None => Ok(()),
	}
}
