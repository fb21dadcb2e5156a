use clap::builder::{
	Styles,
	styling::{AnsiColor, Effects},
};
use tracing_subscriber::EnvFilter;

pub const VERSION: &str = concat!(
	env!("CARGO_PKG_VERSION"),
	"-",
	env!("VERGEN_GIT_SHA"),
	"-",
	env!("VERGEN_CARGO_TARGET_TRIPLE"),
);

pub fn styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Red.on_default() | Effects::BOLD)
		.usage(AnsiColor::Red.on_default() | Effects::BOLD)
		.literal(AnsiColor::Blue.on_default() | Effects::BOLD)
		.placeholder(AnsiColor::Green.on_default())
}

/// Installs the global `fmt` subscriber; an unparsable directive falls back to `info`.
pub fn init_tracing(log_level: &str) {
	let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
	let interrupt = async {
		if let Err(err) = tokio::signal::ctrl_c().await {
			tracing::error!(error = %err, "Failed to listen for Ctrl-C.");
			std::future::pending::<()>().await;
		}
	};
	#[cfg(unix)]
	let terminate = async {
		use tokio::signal::unix::{SignalKind, signal};

		match signal(SignalKind::terminate()) {
			Ok(mut sigterm) => {
				sigterm.recv().await;
			},
			Err(err) => {
				tracing::error!(error = %err, "Failed to listen for SIGTERM.");
				std::future::pending::<()>().await;
			},
		}
	};
	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = interrupt => {},
		_ = terminate => {},
	}

	tracing::info!("Shutdown signal received.");
}
