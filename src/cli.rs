//! Command-line interface.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::config::Settings;
use crate::job_queue::{JobQueue, WorkerPool};
use crate::registry::TaskContext;

#[derive(Parser)]
#[command(name = "loadflow", version, about = "Data ingestion pipeline engine")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the web server.
    Serve {
        /// Override the configured bind host.
        #[arg(long)]
        host: Option<String>,
        /// Override the configured port.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Start the background worker pool.
    Worker {
        /// Override the configured worker count.
        #[arg(long)]
        count: Option<usize>,
    },
    /// Create the schema and seed rows on a fresh database.
    InitDb,
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::from_env().context("loading settings")?;

    match cli.command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                settings.host = host;
            }
            if let Some(port) = port {
                settings.port = port;
            }
            let settings = Arc::new(settings);
            let pool = settings.create_pool()?;
            crate::server::serve(settings, pool).await
        }
        Command::Worker { count } => {
            if let Some(count) = count {
                settings.worker_count = count;
            }
            let lease = settings.lease_seconds;
            let workers = settings.worker_count;
            let settings = Arc::new(settings);
            let pool = settings.create_pool()?;
            let queue = JobQueue::new(pool.clone(), lease);
            let ctx = TaskContext { pool, settings };
            WorkerPool::new(ctx, queue, workers, lease)
                .run()
                .await
                .context("worker pool")
        }
        Command::InitDb => {
            crate::db_build::build(&settings.database_url)
                .await
                .context("bootstrapping schema")?;
            println!("schema created");
            Ok(())
        }
    }
}
