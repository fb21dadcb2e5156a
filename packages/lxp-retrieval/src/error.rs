pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid chunking window: {message}")]
	InvalidChunking { message: String },
	#[error("Vector index error: {message}")]
	Index { message: String },
}
