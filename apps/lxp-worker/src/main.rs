use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	lxp_worker::run(lxp_worker::Args::parse()).await
}
