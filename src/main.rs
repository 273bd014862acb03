use anyhow::Result;
use clap::Parser;
use fwstream::run;
use fwstream::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli).await
}
