//! Job orchestration: intake, the worker execution loop and the event bridge, written against the
//! broker, storage and index capabilities so every piece runs the same on real or in-memory
//! backends.

pub mod bridge;
pub mod generator;
pub mod intake;
pub mod jobs;
pub mod vectorstores;
pub mod worker;

mod error;
mod handlers;

pub use bridge::{BridgeEvent, BridgeOptions, relay};
pub use error::{Error, Result};
pub use generator::{EchoGenerator, GenerationRequest, Generator, HttpGenerator};
pub use intake::{JobReceipt, submit_job};
pub use jobs::{JobView, get_job};
pub use lxp_domain::BoxFuture;
pub use vectorstores::{
	FileView, VectorstoreDetail, VectorstoreView, create_vectorstore, get_vectorstore,
	query_vectorstore, upload_file,
};
pub use worker::{
	Disposition, HandlerError, Outcome, WorkerContext, process_delivery, run_consumer,
};

use std::sync::Arc;

/// Generator for the configured provider, or the offline echo generator when none is set.
pub fn generator_from_config(cfg: &lxp_config::Config) -> Result<Arc<dyn Generator>> {
	match cfg.providers.as_ref().and_then(|providers| providers.generation.as_ref()) {
		Some(generation) => {
			tracing::info!(
				provider_id = %generation.provider_id,
				model = %generation.model,
				"Using HTTP generation provider."
			);

			Ok(Arc::new(HttpGenerator::new(generation)?))
		},
		None => {
			tracing::info!("No generation provider configured. Using echo generator.");

			Ok(Arc::new(EchoGenerator))
		},
	}
}
