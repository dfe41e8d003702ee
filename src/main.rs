use clap::Parser;
use sshfan::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    cli.init_logging()?;

    // Run the batch
    cli.execute().await?;

    Ok(())
}
