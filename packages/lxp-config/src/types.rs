use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub broker: Broker,
	pub storage: Storage,
	pub chunking: Chunking,
	pub retrieval: Retrieval,
	pub worker: Worker,
	#[serde(default)]
	pub bridge: Bridge,
	pub providers: Option<Providers>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Broker {
	pub url: String,
	#[serde(default = "default_tasks_exchange")]
	pub tasks_exchange: String,
	#[serde(default = "default_results_exchange")]
	pub results_exchange: String,
	#[serde(default = "default_dead_letter_exchange")]
	pub dead_letter_exchange: String,
	#[serde(default = "default_dead_letter_queue")]
	pub dead_letter_queue: String,
	/// Unacknowledged deliveries allowed per consumer channel.
	#[serde(default = "default_prefetch")]
	pub prefetch: u16,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
}

/// Character-window chunking. Units are Unicode scalar values.
#[derive(Clone, Debug, Deserialize)]
pub struct Chunking {
	pub window_chars: u32,
	pub overlap_chars: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Retrieval {
	pub top_k: u32,
	pub max_points_per_file: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Worker {
	pub consumers_per_queue: u32,
	/// Sub-function queues this process consumes. Every known sub-function when empty.
	#[serde(default)]
	pub sub_functions: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Bridge {
	/// Seconds without a result message before the stream is closed with an error. Zero disables.
	pub idle_timeout_secs: u64,
	pub keep_alive_secs: u64,
}
impl Default for Bridge {
	fn default() -> Self {
		Self { idle_timeout_secs: 300, keep_alive_secs: 15 }
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct Providers {
	pub generation: Option<LlmProviderConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

fn default_tasks_exchange() -> String {
	"ai.tasks".to_string()
}

fn default_results_exchange() -> String {
	"ai.results".to_string()
}

fn default_dead_letter_exchange() -> String {
	"ai.dlq".to_string()
}

fn default_dead_letter_queue() -> String {
	"q.dlq".to_string()
}

fn default_prefetch() -> u16 {
	8
}
