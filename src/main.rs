use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Error, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use push_dispatch::cleanup::cleanup_notifications;
use push_dispatch::clients::database::PostgresStore;
use push_dispatch::clients::fcm::FcmClient;
use push_dispatch::clients::template::renderer_for;
use push_dispatch::config::Config;
use push_dispatch::dispatch::DispatchEngine;
use push_dispatch::drain::{DrainOutcome, Drainer};
use push_dispatch::models::log::LogLevel;

#[derive(Parser)]
#[command(name = "push_dispatch", about = "Queued push notification dispatcher")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send all queued notifications, then exit
    SendQueued {
        /// Number of parallel shards used to send notifications
        #[arg(short = 'p', long)]
        processes: Option<usize>,

        /// Absolute path of the lockfile to acquire
        #[arg(short = 'L', long)]
        lockfile: Option<PathBuf>,

        /// "0" to log nothing, "1" to only log errors
        #[arg(short = 'l', long)]
        log_level: Option<u8>,
    },

    /// Delete old notifications and their delivery logs
    Cleanup {
        /// Cleanup notifications older than this many days
        #[arg(short = 'd', long)]
        days: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "push_dispatch=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    let store = Arc::new(PostgresStore::connect(&config.database_url).await?);
    sqlx::migrate!("./migrations").run(store.pool()).await?;

    match cli.command {
        Command::SendQueued {
            processes,
            lockfile,
            log_level,
        } => {
            let log_level = match log_level {
                Some(value) => LogLevel::try_from(value).map_err(Error::msg)?,
                None => config.log_level,
            };

            let sender = Arc::new(FcmClient::new(&config).await?);
            let renderer = renderer_for(config.template_engine);
            let engine = DispatchEngine::new(store.clone(), sender, renderer, &config);

            let drainer = Drainer::new(
                engine,
                lockfile.unwrap_or_else(|| config.lockfile.clone()),
                processes.unwrap_or(config.processes),
                log_level,
            );

            match drainer.run().await? {
                DrainOutcome::Completed(report) => info!(
                    attempted = report.attempted(),
                    sent = report.sent,
                    failed = report.failed,
                    "all queued notifications processed"
                ),
                DrainOutcome::LockHeld => {
                    info!("another drain holds the lock, nothing to do")
                }
            }
        }
        Command::Cleanup { days } => {
            let deleted =
                cleanup_notifications(store.as_ref(), days.unwrap_or(config.retention_days))
                    .await?;
            info!(deleted, "cleanup finished");
        }
    }

    Ok(())
}
