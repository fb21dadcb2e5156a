pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {field} {message}")]
	InvalidRequest { field: String, message: String },
	#[error("Invalid job id: {message}")]
	InvalidJobId { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Conflict: {message}")]
	Conflict { message: String },
	#[error("Broker error: {message}")]
	Broker { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Vector index error: {message}")]
	Index { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
}
impl Error {
	pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
		Self::InvalidRequest { field: field.to_string(), message: message.into() }
	}
}
impl From<lxp_domain::Error> for Error {
	fn from(err: lxp_domain::Error) -> Self {
		match err {
			lxp_domain::Error::Validation { field, message } =>
				Self::InvalidRequest { field, message },
			lxp_domain::Error::InvalidJobId { message } => Self::InvalidJobId { message },
			lxp_domain::Error::UnknownSubFunction { name } =>
				Self::NotFound { message: format!("Unknown sub-function {name:?}.") },
			lxp_domain::Error::MalformedMessage { message } =>
				Self::InvalidRequest { field: "body".to_string(), message },
			lxp_domain::Error::UnknownStatus { name } =>
				Self::Storage { message: format!("Stored job has unknown status {name:?}.") },
		}
	}
}
impl From<lxp_storage::Error> for Error {
	fn from(err: lxp_storage::Error) -> Self {
		match err {
			lxp_storage::Error::Database(inner) => Self::Storage { message: inner.to_string() },
			lxp_storage::Error::VectorIndex(inner) => Self::Index { message: inner.to_string() },
			lxp_storage::Error::InvalidStatus(message) => Self::Storage { message },
			lxp_storage::Error::NotFound(message) => Self::NotFound { message },
			lxp_storage::Error::Conflict(message) => Self::Conflict { message },
		}
	}
}
impl From<lxp_broker::Error> for Error {
	fn from(err: lxp_broker::Error) -> Self {
		Self::Broker { message: err.to_string() }
	}
}
impl From<lxp_retrieval::Error> for Error {
	fn from(err: lxp_retrieval::Error) -> Self {
		match err {
			lxp_retrieval::Error::InvalidChunking { message } =>
				Self::InvalidRequest { field: "chunking".to_string(), message },
			lxp_retrieval::Error::Index { message } => Self::Index { message },
		}
	}
}
impl From<color_eyre::Report> for Error {
	fn from(err: color_eyre::Report) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
