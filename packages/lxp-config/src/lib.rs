mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Bridge, Broker, Chunking, Config, LlmProviderConfig, Postgres, Providers, Qdrant, Retrieval,
	Service, Storage, Worker,
};

use std::{fs, path::Path};

pub const SUB_FUNCTIONS: [&str; 5] = ["assist", "galaxy", "coach", "translate", "index"];

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::Read { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::Parse { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.broker.url.trim().is_empty() {
		return Err(Error::Validation { message: "broker.url must be non-empty.".to_string() });
	}

	for (label, value) in [
		("broker.tasks_exchange", &cfg.broker.tasks_exchange),
		("broker.results_exchange", &cfg.broker.results_exchange),
		("broker.dead_letter_exchange", &cfg.broker.dead_letter_exchange),
		("broker.dead_letter_queue", &cfg.broker.dead_letter_queue),
	] {
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	let exchanges = [
		cfg.broker.tasks_exchange.as_str(),
		cfg.broker.results_exchange.as_str(),
		cfg.broker.dead_letter_exchange.as_str(),
	];

	if exchanges[0] == exchanges[1] || exchanges[0] == exchanges[2] || exchanges[1] == exchanges[2]
	{
		return Err(Error::Validation {
			message: "broker exchanges must have distinct names.".to_string(),
		});
	}
	if cfg.broker.prefetch == 0 {
		return Err(Error::Validation {
			message: "broker.prefetch must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.chunking.window_chars == 0 {
		return Err(Error::Validation {
			message: "chunking.window_chars must be greater than zero.".to_string(),
		});
	}
	if cfg.chunking.overlap_chars >= cfg.chunking.window_chars {
		return Err(Error::Validation {
			message: "chunking.overlap_chars must be less than chunking.window_chars.".to_string(),
		});
	}
	if cfg.retrieval.top_k == 0 {
		return Err(Error::Validation {
			message: "retrieval.top_k must be greater than zero.".to_string(),
		});
	}
	if cfg.retrieval.max_points_per_file == 0 {
		return Err(Error::Validation {
			message: "retrieval.max_points_per_file must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.consumers_per_queue == 0 {
		return Err(Error::Validation {
			message: "worker.consumers_per_queue must be greater than zero.".to_string(),
		});
	}

	for name in &cfg.worker.sub_functions {
		if !SUB_FUNCTIONS.contains(&name.as_str()) {
			return Err(Error::Validation {
				message: format!(
					"worker.sub_functions entry {name:?} must be one of assist, galaxy, coach, translate, or index."
				),
			});
		}
	}

	if cfg.bridge.keep_alive_secs == 0 {
		return Err(Error::Validation {
			message: "bridge.keep_alive_secs must be greater than zero.".to_string(),
		});
	}

	if let Some(generation) = cfg.providers.as_ref().and_then(|p| p.generation.as_ref()) {
		for (label, value) in [
			("providers.generation.api_base", &generation.api_base),
			("providers.generation.api_key", &generation.api_key),
			("providers.generation.model", &generation.model),
		] {
			if value.trim().is_empty() {
				return Err(Error::Validation { message: format!("{label} must be non-empty.") });
			}
		}

		if !generation.temperature.is_finite() || generation.temperature < 0.0 {
			return Err(Error::Validation {
				message: "providers.generation.temperature must be a finite number zero or greater."
					.to_string(),
			});
		}
		if generation.timeout_ms == 0 {
			return Err(Error::Validation {
				message: "providers.generation.timeout_ms must be greater than zero.".to_string(),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	for name in &mut cfg.worker.sub_functions {
		*name = name.trim().to_ascii_lowercase();
	}

	cfg.worker.sub_functions.sort();
	cfg.worker.sub_functions.dedup();

	if cfg.providers.as_ref().map(|p| p.generation.is_none()).unwrap_or(false) {
		cfg.providers = None;
	}
}
