//! HTTP and socket surface for pipeline runs.

mod auth;
mod handlers;
mod routes;

pub use auth::{principal_from_headers, Principal, USER_HEADER};
pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::Settings;
use crate::engine::TaskEngine;
use crate::error::CoreError;
use crate::job_queue::JobQueue;
use crate::models::User;
use crate::notify::Publisher;
use crate::repository::{
    PgPool, RunRepository, SourceTableRepository, UserRepository,
};

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub users: UserRepository,
    pub runs: RunRepository,
    pub source_tables: SourceTableRepository,
    pub engine: TaskEngine,
    /// Fan-out of task-change notifications to socket subscribers.
    pub task_events: Publisher,
}

impl AppState {
    pub fn new(settings: Arc<Settings>, pool: PgPool) -> Self {
        let queue = JobQueue::new(pool.clone(), settings.lease_seconds);
        let task_events = Publisher::new(pool.database_url(), &settings.task_channel);
        Self {
            users: UserRepository::new(pool.clone()),
            runs: RunRepository::new(pool.clone()),
            source_tables: SourceTableRepository::new(pool.clone()),
            engine: TaskEngine::new(pool, settings.clone(), queue),
            task_events,
            settings,
        }
    }

    /// Resolve the authenticated principal to a user with roles.
    pub async fn require_user(&self, principal: &Principal) -> Result<User, CoreError> {
        self.users
            .by_username(&principal.username)
            .await?
            .ok_or_else(|| {
                CoreError::unauthorized(format!("unknown user {}", principal.username))
            })
    }
}

/// Start the web server.
pub async fn serve(settings: Arc<Settings>, pool: PgPool) -> anyhow::Result<()> {
    let host = settings.host.clone();
    let port = settings.port;
    let state = AppState::new(settings, pool);
    let app = create_router(state)
        .layer(axum::middleware::from_fn(auth::principal_from_headers));

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
