use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::trace;

use crate::retry::Retrier;
use crate::storage::StorageSettings;

fn default_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Command line and environment configuration of the server
#[derive(Debug, Clone, Parser)]
#[command(name = "keeper-server", about = "Receives and stores pushed metrics")]
pub struct ServerArgs {
    /// Address to listen on
    #[arg(short, long, env = "ADDRESS", default_value_t = default_address())]
    pub address: SocketAddr,

    /// Snapshot interval in seconds (0 dumps after every write)
    #[arg(short = 'i', long, env = "STORE_INTERVAL", default_value_t = 300)]
    pub store_interval: u64,

    /// Snapshot file (empty disables the file backend)
    #[arg(short = 'f', long, env = "FILE_STORAGE_PATH", default_value = "metrics-db.json")]
    pub file_storage_path: String,

    /// Database connection string (takes precedence over the file backend)
    #[arg(short = 'd', long, env = "DATABASE_DSN", default_value = "")]
    pub database_dsn: String,

    /// Restore the snapshot on start
    #[arg(
        short,
        long,
        env = "RESTORE",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub restore: bool,
}

impl ServerArgs {
    pub fn storage_settings(&self) -> StorageSettings {
        let settings = StorageSettings {
            database_url: Some(self.database_dsn.clone()).filter(|dsn| !dsn.is_empty()),
            file_path: Some(self.file_storage_path.as_str())
                .filter(|path| !path.is_empty())
                .map(PathBuf::from),
            store_interval: Duration::from_secs(self.store_interval),
            restore: self.restore,
            retrier: Retrier::default(),
        };
        trace!("resolved storage settings: {settings:?}");
        settings
    }
}

/// Command line and environment configuration of the agent
#[derive(Debug, Clone, Parser)]
#[command(name = "keeper-agent", about = "Samples host metrics and pushes them to the server")]
pub struct AgentArgs {
    /// Server address
    #[arg(short, long, env = "ADDRESS", default_value_t = default_address())]
    pub address: SocketAddr,

    /// Sampling interval in seconds
    #[arg(short, long, env = "POLL_INTERVAL", default_value_t = 2)]
    pub poll_interval: u64,

    /// Reporting interval in seconds
    #[arg(short, long, env = "REPORT_INTERVAL", default_value_t = 10)]
    pub report_interval: u64,
}

/// Resolved agent configuration
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Base URL of the server (e.g., "http://127.0.0.1:8080")
    pub server_url: String,
    pub poll_interval: Duration,
    pub report_interval: Duration,
    pub retrier: Retrier,
}

impl AgentArgs {
    pub fn agent_settings(&self) -> AgentSettings {
        AgentSettings {
            server_url: format!("http://{}", self.address),
            poll_interval: Duration::from_secs(self.poll_interval.max(1)),
            report_interval: Duration::from_secs(self.report_interval.max(1)),
            retrier: Retrier::default(),
        }
    }
}
