mod capture;
mod cli;
mod config;
mod diff;
mod event;
mod monitor;
mod notify;

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run().await
}
