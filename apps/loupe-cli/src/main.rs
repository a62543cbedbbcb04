use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = loupe_cli::Args::parse();
	loupe_cli::run(args).await
}
