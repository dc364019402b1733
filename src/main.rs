//! loadflow - multi-stage data ingestion pipeline.
//!
//! Orchestrates pipeline runs through collection, load, check, and qa
//! stages, with interactive and worker-executed tasks backed by PostgreSQL.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loadflow=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    loadflow::cli::run().await
}
