use clap::Parser;
use mcp_cookie_relay::cli::{self, args::Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli::run(cli).await
}
