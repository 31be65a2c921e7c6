//! Aggregated GitHub payload endpoint.

use axum::{extract::State, Json};

use crate::aggregate::Aggregator;
use crate::models::CachedPayload;
use crate::AppState;

/// GET /api/github - Organization stats, repositories, members and blog posts.
pub async fn get_github(State(state): State<AppState>) -> Json<CachedPayload> {
    let aggregator = Aggregator::new(
        &state.config,
        &state.store,
        &state.cache,
        state.http.clone(),
    );
    Json(aggregator.load().await)
}
