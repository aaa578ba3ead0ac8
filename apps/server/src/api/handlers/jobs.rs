//! Job status handlers.

use crate::{state::AppState, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

/// Get a single job by ID
pub async fn get_job(State(state): State<AppState>, Path(job_id): Path<Uuid>) -> Result<Response> {
    let job = state.job_queue.get_job(job_id).await?;

    match job {
        Some(job) => Ok((
            StatusCode::OK,
            Json(json!({
                "id": job.id,
                "jobType": job.job_type,
                "status": job.status,
                "priority": job.priority,
                "progress": job.progress,
                "processedItems": job.processed_items,
                "totalItems": job.total_items,
                "progressPercent": job.progress_percent(),
                "errorMessage": job.error_message,
                "lastErrorAt": job.last_error_at,
                "scheduledAt": job.scheduled_at,
                "createdAt": job.created_at,
                "startedAt": job.started_at,
                "completedAt": job.completed_at,
                "workerId": job.worker_id,
                "retryCount": job.retry_count,
            })),
        )
            .into_response()),
        None => Err(crate::Error::NotFound(format!("Job {} not found", job_id))),
    }
}

/// Get queue health and statistics
pub async fn get_queue_health(State(state): State<AppState>) -> Result<Response> {
    let health = state.job_queue.health_check().await?;
    Ok((StatusCode::OK, Json(health)).into_response())
}
