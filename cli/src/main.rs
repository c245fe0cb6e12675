use std::process::ExitCode;

use clap::Parser;
use replicate_images::{cli::Cli, run};

#[tokio::main]
async fn main() -> color_eyre::Result<ExitCode> {
    pretty_env_logger::init();
    color_eyre::install()?;

    let cli = Cli::parse();
    Ok(run(cli).await.into())
}
