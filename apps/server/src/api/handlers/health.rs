//! Liveness and readiness handler.

use crate::{state::AppState, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Report service health, including database connectivity.
pub async fn health(State(state): State<AppState>) -> Result<Response> {
    let db_ok = sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.db_pool)
        .await
        .is_ok();

    let status = if db_ok { "ok" } else { "degraded" };
    let code = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    Ok((
        code,
        Json(json!({
            "status": status,
            "database": db_ok,
        })),
    )
        .into_response())
}
