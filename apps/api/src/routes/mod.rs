pub mod health;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

use crate::plan::handlers as plan;
use crate::portfolio::handlers as portfolio;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Portfolio snapshot
        .route(
            "/api/v1/state",
            get(portfolio::handle_get_state).post(portfolio::handle_put_state),
        )
        // Plan API
        .route("/api/v1/plan/start", post(plan::handle_start))
        .route("/api/v1/plan/generate", post(plan::handle_generate))
        .route("/api/v1/plan/status", get(plan::handle_status))
        .with_state(state)
        // Last layer runs first: stamp the id, then echo it on the response.
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}
