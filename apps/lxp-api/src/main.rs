use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	lxp_api::run(lxp_api::Args::parse()).await
}
