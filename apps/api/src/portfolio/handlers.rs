//! Axum route handlers for the portfolio snapshot.

use axum::{extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};
use tracing::info;

use crate::errors::AppError;
use crate::state::AppState;

/// GET /api/v1/state
///
/// Returns `{ok, state}`; `state` is an empty object until one is saved.
pub async fn handle_get_state(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let snapshot = state.portfolio.load().await?.unwrap_or_else(|| json!({}));
    Ok(Json(json!({ "ok": true, "state": snapshot })))
}

/// POST /api/v1/state
///
/// Replaces the stored snapshot. Requires `x-admin-key`.
pub async fn handle_put_state(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let expected = state
        .config
        .admin_key
        .as_deref()
        .ok_or_else(|| AppError::Config("TRADE_ADMIN_KEY is not set".to_string()))?;
    let supplied = headers.get("x-admin-key").and_then(|v| v.to_str().ok());
    if supplied != Some(expected) {
        return Err(AppError::Unauthorized);
    }

    if !body.is_object() {
        return Err(AppError::Input("state must be a JSON object".to_string()));
    }

    state.portfolio.save(&body).await?;
    info!("Portfolio snapshot saved");
    Ok(Json(json!({ "ok": true })))
}
