//! Blog reaction endpoints.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;

use crate::errors::AppError;
use crate::models::{ReactRequest, ReactionView};
use crate::reactions::{self, ClientIp, Outcome};
use crate::AppState;

/// GET /api/blog/{slug}/reactions - Counts plus the caller's current emoji.
pub async fn get_reactions(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    ClientIp(ip): ClientIp,
) -> Result<Json<ReactionView>, AppError> {
    let actor = reactions::actor_key(&state.config.reaction_salt, &ip);

    let reaction_state = state
        .store
        .get_reactions(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Blog post {} not found", slug)))?;

    Ok(Json(reactions::view(&reaction_state, Some(&actor), false)))
}

/// POST /api/blog/{slug}/reactions - Add, toggle off or switch the caller's emoji.
pub async fn react(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    ClientIp(ip): ClientIp,
    body: Result<Json<ReactRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ReactionView>), AppError> {
    let Json(request) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let emoji = reactions::validate_emoji(request.emoji.as_deref())?;

    let actor = reactions::actor_key(&state.config.reaction_salt, &ip);
    let now_ms = Utc::now().timestamp_millis();

    let (outcome, reaction_state) = state
        .store
        .update_reactions(&slug, |reaction_state| {
            let outcome = reactions::apply(reaction_state, &actor, &emoji, now_ms);
            (outcome, outcome.changed())
        })
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Blog post {} not found", slug)))?;

    tracing::debug!("Reaction on {}: {:?}", slug, outcome);

    if outcome == Outcome::Limited {
        return Ok((
            StatusCode::TOO_MANY_REQUESTS,
            Json(reactions::view(&reaction_state, Some(&actor), true)),
        ));
    }

    Ok((
        StatusCode::OK,
        Json(reactions::view(&reaction_state, Some(&actor), false)),
    ))
}
