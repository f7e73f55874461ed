use clap::Parser;
use metrics_keeper::{agent, config::AgentArgs};
use tokio_util::sync::CancellationToken;
use tracing::{info, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

fn init() {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new()
        .with_target("metrics_keeper", tracing::metadata::LevelFilter::DEBUG)
        .with_target("keeper_agent", tracing::metadata::LevelFilter::TRACE);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(true),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = AgentArgs::parse();
    trace!("started with args: {args:?}");

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutting down");
            trigger.cancel();
        }
    });

    agent::run(args.agent_settings(), cancel).await
}
