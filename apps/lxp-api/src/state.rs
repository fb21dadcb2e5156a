use std::{sync::Arc, time::Duration};

use lxp_broker::{ResultSource, TaskPublisher, TopologyPlan, amqp::AmqpBroker, ensure_topology};
use lxp_retrieval::VectorIndex;
use lxp_service::BridgeOptions;
use lxp_storage::{JobStore, VectorstoreCatalog, db::Db, qdrant::QdrantStore};

#[derive(Clone)]
pub struct AppState {
	pub jobs: Arc<dyn JobStore>,
	pub catalog: Arc<dyn VectorstoreCatalog>,
	pub index: Arc<dyn VectorIndex>,
	pub tasks: Arc<dyn TaskPublisher>,
	pub results: Arc<dyn ResultSource>,
	pub bridge: BridgeOptions,
	pub keep_alive: Duration,
	/// Default `top_k` for synchronous vectorstore queries.
	pub top_k: usize,
}
impl AppState {
	/// Connects every backend. The broker topology is declared first; a mismatch aborts startup.
	pub async fn connect(config: &lxp_config::Config) -> color_eyre::Result<Self> {
		let broker = Arc::new(AmqpBroker::connect(&config.broker).await?);

		ensure_topology(broker.as_ref(), &TopologyPlan::from_config(&config.broker)).await?;

		let db = Arc::new(Db::connect(&config.storage.postgres).await?);

		db.ensure_schema().await?;

		let qdrant = QdrantStore::new(&config.storage.qdrant)?;

		Ok(Self {
			jobs: db.clone(),
			catalog: db,
			index: Arc::new(qdrant),
			tasks: broker.clone(),
			results: broker,
			bridge: BridgeOptions::from_config(&config.bridge),
			keep_alive: Duration::from_secs(config.bridge.keep_alive_secs),
			top_k: config.retrieval.top_k as usize,
		})
	}
}
