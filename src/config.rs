//! Environment-driven configuration.

use std::env;
use std::path::PathBuf;

use thiserror::Error;

use crate::repository::PgPool;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Default pool size; workers and request handlers share one pool.
const DEFAULT_POOL_SIZE: usize = 10;
/// Default worker count for the job queue.
const DEFAULT_WORKERS: usize = 4;
/// Default lease duration for claimed jobs, in seconds.
const DEFAULT_LEASE_SECONDS: u64 = 300;

/// Runtime settings, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    /// PostgreSQL connection URL; also used by the COPY sink and the
    /// notification listener, which hold their own raw connections.
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub worker_count: usize,
    pub lease_seconds: u64,
    /// Root directory holding per-run source file folders.
    pub data_dir: PathBuf,
    /// LISTEN/NOTIFY channel carrying task-change payloads.
    pub task_channel: String,
    /// Opaque secret handed to the session collaborator; the core never
    /// interprets it.
    pub session_secret: String,
    pub pool_size: usize,
}

impl Settings {
    /// Read settings from the environment. `.env` loading (dotenvy) happens
    /// in `main` before this is called.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;

        Ok(Self {
            database_url,
            host: env::var("LOADFLOW_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_env("LOADFLOW_PORT", 8484)?,
            worker_count: parse_env("LOADFLOW_WORKERS", DEFAULT_WORKERS)?,
            lease_seconds: parse_env("LOADFLOW_LEASE_SECONDS", DEFAULT_LEASE_SECONDS)?,
            data_dir: env::var("LOADFLOW_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            task_channel: env::var("LOADFLOW_TASK_CHANNEL")
                .unwrap_or_else(|_| "pipeline_run_tasks".to_string()),
            session_secret: env::var("LOADFLOW_SESSION_SECRET").unwrap_or_default(),
            pool_size: parse_env("LOADFLOW_POOL_SIZE", DEFAULT_POOL_SIZE)?,
        })
    }

    /// Build the shared diesel-async pool.
    pub fn create_pool(&self) -> Result<PgPool, ConfigError> {
        PgPool::new(&self.database_url, self.pool_size).map_err(|e| ConfigError::Invalid {
            key: "DATABASE_URL",
            message: e.to_string(),
        })
    }

    /// Directory holding the source files collected for a run.
    pub fn run_dir(&self, run_id: i64) -> PathBuf {
        self.data_dir.join("runs").join(run_id.to_string())
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
