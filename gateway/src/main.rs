mod config;
mod connection;
mod delta;
mod engine;
mod server;
mod session;
mod window;

use clap::Parser;
use config::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    server::run(args).await
}
