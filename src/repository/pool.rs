//! PostgreSQL connection pool.
//!
//! Diesel-async connections pooled through deadpool. The pool handle is
//! threaded explicitly through constructors; nothing holds a global.

use diesel_async::pooled_connection::deadpool::Pool as DeadPool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;

use crate::error::CoreError;

/// A pooled async PostgreSQL connection.
pub type PgConn = deadpool::managed::Object<AsyncDieselConnectionManager<AsyncPgConnection>>;

/// Shared connection pool handle.
#[derive(Clone)]
pub struct PgPool {
    pool: DeadPool<AsyncPgConnection>,
    database_url: String,
}

impl PgPool {
    pub fn new(database_url: &str, max_size: usize) -> Result<Self, String> {
        let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = DeadPool::builder(config)
            .max_size(max_size)
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self {
            pool,
            database_url: database_url.to_string(),
        })
    }

    /// Get a connection; released back to the pool on drop.
    pub async fn get(&self) -> Result<PgConn, CoreError> {
        self.pool.get().await.map_err(|e| CoreError::Pool(e.to_string()))
    }

    /// The raw connection URL, for the components that speak the wire
    /// protocol directly (COPY sink, notification listener).
    pub fn database_url(&self) -> &str {
        &self.database_url
    }
}
