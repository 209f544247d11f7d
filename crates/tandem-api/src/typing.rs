use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use tandem_types::api::Claims;

use crate::auth::{AppState, blocking};
use crate::matches::participant_match;

/// Stamped with the server clock so a client running ahead cannot keep its
/// indicator alive past the TTL.
pub async fn set_typing(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    participant_match(&state, match_id, claims.sub).await?;
    let user = claims.sub;
    blocking(&state, move |db| db.upsert_typing(match_id, user, Utc::now())).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear_typing(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    participant_match(&state, match_id, claims.sub).await?;
    let user = claims.sub;
    blocking(&state, move |db| db.delete_typing(match_id, user)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// The raw row, or JSON `null`. Liveness is judged by the reader.
pub async fn get_typing(
    State(state): State<AppState>,
    Path((match_id, user_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    participant_match(&state, match_id, claims.sub).await?;
    let indicator = blocking(&state, move |db| {
        db.get_typing(match_id, user_id)?
            .map(|row| row.into_model())
            .transpose()
    })
    .await?;
    Ok(Json(indicator))
}
