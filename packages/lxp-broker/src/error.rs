pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Amqp(#[from] lapin::Error),
	#[error("Broker refused message for exchange {exchange:?} with routing key {routing_key:?}.")]
	Nack { exchange: String, routing_key: String },
	#[error("Broker connection is closed.")]
	Closed,
	#[error("Broker topology error: {message}")]
	Topology { message: String },
}
