//! Axum route handlers for the Plan API.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::plan::canonical::{canonicalize, InputError, JobKey};
use crate::plan::jobs::JobStatusView;
use crate::plan::starter::{start, StartOutcome};
use crate::state::AppState;

const REQUEST_ID: &str = "x-request-id";

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub state: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub key: String,
    pub state: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub accepted: bool,
    pub key: JobKey,
    pub request_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub key: String,
}

/// Correlation id stamped by the request-id layer, or a fresh one when the
/// caller supplied something that is not a UUID.
pub fn request_id(headers: &HeaderMap) -> Uuid {
    let supplied = headers.get(REQUEST_ID).and_then(|v| v.to_str().ok());
    match supplied.map(Uuid::parse_str) {
        Some(Ok(id)) => id,
        Some(Err(_)) => {
            let minted = Uuid::new_v4();
            info!(supplied, request_id = %minted, "caller request id is not a uuid, minted one");
            minted
        }
        None => Uuid::new_v4(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/plan/start
///
/// Cache hit, already running, or "trigger generation for this key".
pub async fn handle_start(
    State(state): State<AppState>,
    Json(request): Json<StartRequest>,
) -> Result<Json<StartOutcome>, AppError> {
    let raw = request.state.ok_or(InputError::MissingState)?;
    let outcome = start(state.jobs.as_ref(), &raw).await?;
    Ok(Json(outcome))
}

/// POST /api/v1/plan/generate
///
/// Claims the key before answering, then spawns the staged pipeline and
/// returns 202. The key is recomputed from the submitted state so a document
/// can never land under another key. `accepted` is false when another run
/// already owns the key.
pub async fn handle_generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<GenerateRequest>,
) -> Result<(StatusCode, [(&'static str, String); 1], Json<GenerateResponse>), AppError> {
    let claimed = JobKey::parse(&request.key)?;
    let raw = request.state.ok_or(InputError::MissingState)?;
    let (sanitized, key) = canonicalize(&raw)?;
    if key != claimed {
        return Err(InputError::KeyMismatch.into());
    }

    let request_id = request_id(&headers);
    let claim = state.worker.claim(&key, request_id).await?;
    let accepted = claim.is_some();
    if let Some(claim) = claim {
        let worker = state.worker.clone();
        tokio::spawn(async move {
            let job_key = claim.key().clone();
            if let Err(e) = worker.generate(claim, &sanitized).await {
                error!(
                    key = %job_key,
                    %request_id,
                    error = %e,
                    "worker could not reach the job store"
                );
            }
        });
    }

    Ok((
        StatusCode::ACCEPTED,
        [(REQUEST_ID, request_id.to_string())],
        Json(GenerateResponse {
            accepted,
            key,
            request_id,
        }),
    ))
}

/// GET /api/v1/plan/status?key=
pub async fn handle_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<JobStatusView>, AppError> {
    let key = JobKey::parse(&query.key)?;
    let record = state.jobs.get(&key).await?;
    Ok(Json(JobStatusView::from(record)))
}
