use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = rolo_api::Args::parse();

	rolo_api::run(args).await
}
