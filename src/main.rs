mod catalog;
mod cli;
mod config;
mod events;
mod identity;
mod ingest;
mod model;
mod nbt;
mod projection;
mod remote;
mod storage;
mod views;
mod world;

use std::process;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "mmnm_mirror=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = cli::run().await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
