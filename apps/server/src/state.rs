//! Shared application state

use crate::{
    config::Config,
    db::StagingStore,
    queue::{InlineJobQueue, JobQueue, PostgresJobQueue},
    services::IngestService,
    Result,
};
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub enum JobQueueKind {
    /// Persist jobs in Postgres and rely on background workers.
    Postgres,
    /// Execute supported jobs immediately in-process (useful for tests).
    Inline,
}

#[derive(Debug, Clone)]
pub struct AppStateOptions {
    pub run_migrations: bool,
    pub job_queue: JobQueueKind,
}

impl Default for AppStateOptions {
    fn default() -> Self {
        Self {
            run_migrations: true,
            job_queue: JobQueueKind::Postgres,
        }
    }
}

/// Shared application state passed to all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db_pool: PgPool,
    pub job_queue: Arc<dyn JobQueue>,
    pub staging_store: StagingStore,
    pub ingest_service: Arc<IngestService>,
}

impl AppState {
    /// Initialize the application state
    pub async fn new(config: Config) -> Result<Self> {
        Self::new_with_options(config, AppStateOptions::default()).await
    }

    pub async fn new_with_options(config: Config, options: AppStateOptions) -> Result<Self> {
        tracing::info!("Initializing application state...");

        let config_arc = Arc::new(config);

        let db_pool = create_db_pool(config_arc.as_ref()).await?;

        if options.run_migrations {
            tracing::info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&db_pool)
                .await
                .map_err(|e| crate::Error::Internal(format!("Migration failed: {}", e)))?;
        }

        // Create job queue (may run jobs inline for tests).
        let job_queue: Arc<dyn JobQueue> = match options.job_queue {
            JobQueueKind::Postgres => Arc::new(PostgresJobQueue::new(
                db_pool.clone(),
                config_arc.workers.poll_interval_seconds,
            )),
            JobQueueKind::Inline => Arc::new(InlineJobQueue::new(db_pool.clone())),
        };

        let staging_store = StagingStore::new(db_pool.clone());
        let ingest_service = Arc::new(IngestService::new(job_queue.clone()));

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config: config_arc,
            db_pool,
            job_queue,
            staging_store,
            ingest_service,
        })
    }
}

async fn create_db_pool(config: &Config) -> Result<PgPool> {
    tracing::info!("Creating database connection pool...");

    let statement_timeout = config.database.statement_timeout_seconds;
    let lock_timeout = config.database.lock_timeout_seconds;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .min_connections(config.database.pool_min_size)
        .max_connections(config.database.pool_max_size)
        .acquire_timeout(std::time::Duration::from_secs(
            config.database.pool_timeout_seconds,
        ))
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                // Max query execution time.
                sqlx::query(&format!("SET statement_timeout = '{}s'", statement_timeout))
                    .execute(&mut *conn)
                    .await?;

                // Max lock wait time, fail fast.
                sqlx::query(&format!("SET lock_timeout = '{}s'", lock_timeout))
                    .execute(&mut *conn)
                    .await?;

                Ok(())
            })
        })
        .connect(&config.database.url)
        .await
        .map_err(crate::Error::Database)?;

    tracing::info!(
        "Database pool created (min: {}, max: {})",
        config.database.pool_min_size,
        config.database.pool_max_size
    );

    Ok(pool)
}
