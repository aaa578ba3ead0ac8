//! Lightweight state for background workers
//!
//! Workers don't need the HTTP router or ingest pipeline. This module
//! provides the minimal state the worker binary needs: a pool sized for
//! worker traffic, the queue, and the staging writer.

use crate::{
    config::Config,
    db::StagingStore,
    queue::{JobQueue, PostgresJobQueue},
    Result,
};
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct WorkerState {
    pub config: Arc<Config>,
    pub db_pool: PgPool,
    pub job_queue: Arc<dyn JobQueue>,
    pub staging_store: StagingStore,
}

impl WorkerState {
    pub async fn new(config: Config) -> Result<Self> {
        tracing::info!("Initializing worker state...");

        let db_pool = create_db_pool(&config).await?;

        // Migrations are idempotent; running them here lets the worker start
        // before the server on a fresh database.
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&db_pool)
            .await
            .map_err(|e| match e {
                sqlx::migrate::MigrateError::Execute(db_err) => crate::Error::Database(db_err),
                other => crate::Error::Internal(format!("Migration failed: {}", other)),
            })?;

        let job_queue: Arc<dyn JobQueue> = Arc::new(PostgresJobQueue::new(
            db_pool.clone(),
            config.workers.poll_interval_seconds,
        ));

        let staging_store = StagingStore::new(db_pool.clone());

        tracing::info!("Worker state initialized successfully");

        Ok(Self {
            config: Arc::new(config),
            db_pool,
            job_queue,
            staging_store,
        })
    }
}

async fn create_db_pool(config: &Config) -> Result<PgPool> {
    tracing::info!("Creating worker database connection pool...");

    let statement_timeout = config.database.statement_timeout_seconds;
    let lock_timeout = config.database.lock_timeout_seconds;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .min_connections(config.database.worker_pool_min_size)
        .max_connections(config.database.worker_pool_max_size)
        .acquire_timeout(std::time::Duration::from_secs(
            config.database.worker_pool_timeout_seconds,
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
        "Worker database pool created (min: {}, max: {})",
        config.database.worker_pool_min_size,
        config.database.worker_pool_max_size
    );

    Ok(pool)
}
