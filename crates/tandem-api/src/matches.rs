use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use tandem_types::api::{Claims, UpsertMatchRequest};
use tandem_types::{CanonicalPair, Match};

use crate::auth::{AppState, blocking, ensure_self};

/// Conflict-ignoring upsert; both argument orders return the same row.
pub async fn upsert_match(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpsertMatchRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let pair = CanonicalPair::new(req.user1_id, req.user2_id);
    if pair.is_degenerate() {
        return Err(StatusCode::BAD_REQUEST);
    }
    if !pair.contains(claims.sub) {
        return Err(StatusCode::FORBIDDEN);
    }
    let matched = blocking(&state, move |db| db.upsert_match(pair, Utc::now())?.into_model()).await?;
    Ok(Json(matched))
}

pub async fn get_match(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let matched = participant_match(&state, match_id, claims.sub).await?;
    Ok(Json(matched))
}

pub async fn matches_for_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    ensure_self(&claims, user_id)?;
    let matches = blocking(&state, move |db| {
        db.matches_for_user(user_id)?
            .into_iter()
            .map(|row| row.into_model())
            .collect::<anyhow::Result<Vec<_>>>()
    })
    .await?;
    Ok(Json(matches))
}

/// Loads a match, 404 if it does not exist and 403 if `user` is not in it.
pub(crate) async fn participant_match(
    state: &AppState,
    match_id: Uuid,
    user: Uuid,
) -> Result<Match, StatusCode> {
    let matched = blocking(state, move |db| {
        db.get_match(match_id)?.map(|row| row.into_model()).transpose()
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    if matched.other_user(user).is_none() {
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(matched)
}
