use anyhow::Context;
use clap::Parser;
use metrics_keeper::{
    api::{ApiState, spawn_api_server},
    config::ServerArgs,
    storage::open_storage,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

fn init() {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("metrics_keeper", LevelFilter::DEBUG),
        ("keeper_server", LevelFilter::TRACE),
        ("tower_http", LevelFilter::DEBUG),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = ServerArgs::parse();
    trace!("started with args: {args:?}");

    let shutdown = CancellationToken::new();
    let storage = open_storage(&args.storage_settings(), &shutdown)
        .await
        .context("failed to open storage")?;

    let state = ApiState::new(storage.clone(), shutdown.clone());
    let (addr, server) = spawn_api_server(args.address, state).await?;
    info!("serving metrics on {addr}");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");
    shutdown.cancel();

    if let Err(e) = server.await {
        error!("server task failed: {e}");
    }
    storage.close().await.context("failed to close storage")?;

    Ok(())
}
