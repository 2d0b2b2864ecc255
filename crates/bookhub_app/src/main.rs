mod platform;

use clap::Parser;
use platform::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    platform::run(Cli::parse()).await
}
