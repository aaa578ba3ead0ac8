//! Bundle submission handler.

use crate::{state::AppState, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value as JsonValue};

/// Accept a FHIR bundle document for staging.
///
/// The document is normalized synchronously and one staging job is queued per
/// submission. Responds 202 with a receipt; writes happen in the background.
pub async fn submit_bundle(
    State(state): State<AppState>,
    Json(document): Json<JsonValue>,
) -> Result<Response> {
    let receipt = state.ingest_service.submit_bundle(&document).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "jobId": receipt.job_id,
            "patients": receipt.patients,
            "encounters": receipt.encounters,
            "observations": receipt.observations,
        })),
    )
        .into_response())
}
