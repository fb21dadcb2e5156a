pub mod consumers;

use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use tokio_util::sync::CancellationToken;

use lxp_broker::{TopologyPlan, amqp::AmqpBroker, ensure_topology};
use lxp_retrieval::Chunker;
use lxp_service::WorkerContext;
use lxp_storage::{db::Db, qdrant::QdrantStore};

#[derive(Debug, Parser)]
#[command(
	version = lxp_cli::VERSION,
	rename_all = "kebab",
	styles = lxp_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = lxp_config::load(&args.config)?;

	lxp_cli::init_tracing(&config.service.log_level);

	let sub_functions = consumers::selected_sub_functions(&config.worker)?;
	let broker = Arc::new(AmqpBroker::connect(&config.broker).await?);

	ensure_topology(broker.as_ref(), &TopologyPlan::from_config(&config.broker)).await?;

	let db = Arc::new(Db::connect(&config.storage.postgres).await?);

	db.ensure_schema().await?;

	let ctx = WorkerContext {
		jobs: db.clone(),
		catalog: db,
		index: Arc::new(QdrantStore::new(&config.storage.qdrant)?),
		results: broker.clone(),
		generator: lxp_service::generator_from_config(&config)?,
		chunker: Chunker::new(
			config.chunking.window_chars as usize,
			config.chunking.overlap_chars as usize,
		)?,
		top_k: config.retrieval.top_k as usize,
		max_points_per_file: config.retrieval.max_points_per_file as usize,
	};
	let cancel = CancellationToken::new();
	let running = consumers::spawn_consumers(
		broker.clone(),
		ctx,
		&sub_functions,
		config.worker.consumers_per_queue,
		config.broker.prefetch,
		&cancel,
	);
	let outcome = consumers::supervise(running, cancel, lxp_cli::shutdown_signal()).await;

	if let Err(err) = broker.close().await {
		tracing::warn!(error = %err, "Failed to close broker connection.");
	}

	outcome
}
