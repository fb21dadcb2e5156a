pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid job id: {message}")]
	InvalidJobId { message: String },
	#[error("Unknown sub-function {name:?}.")]
	UnknownSubFunction { name: String },
	#[error("Unknown job status {name:?}.")]
	UnknownStatus { name: String },
	#[error("Invalid field {field}: {message}")]
	Validation { field: String, message: String },
	#[error("Malformed message: {message}")]
	MalformedMessage { message: String },
}
