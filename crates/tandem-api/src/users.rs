use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use tandem_types::api::{Claims, DeviceTokenRequest};

use crate::auth::{AppState, blocking, ensure_self};

/// Display fields for a user, e.g. the caller on an incoming call prompt.
pub async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let profile = blocking(&state, move |db| {
        db.get_user(user_id)?.map(|row| row.into_model()).transpose()
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(profile))
}

pub async fn register_device_token(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<DeviceTokenRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    ensure_self(&claims, user_id)?;
    let token = req.token.trim().to_string();
    if token.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    blocking(&state, move |db| db.upsert_device_token(user_id, &token, Utc::now())).await?;
    Ok(StatusCode::NO_CONTENT)
}
