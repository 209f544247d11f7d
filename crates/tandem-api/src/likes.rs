use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use tandem_types::api::{Claims, ExistsResponse, LikeRequest, LikeResponse, TargetRequest};

use crate::auth::{AppState, blocking, ensure_self};

pub async fn create_like(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<LikeRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let from = claims.sub;
    let to = req.to_user_id;
    if from == to {
        return Err(StatusCode::BAD_REQUEST);
    }
    let inserted = blocking(&state, move |db| db.insert_like(from, to, Utc::now())).await?;
    Ok(Json(LikeResponse { inserted }))
}

/// Either side of a like may check it; the resolver reads the reverse
/// direction.
pub async fn like_exists(
    State(state): State<AppState>,
    Path((from, to)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    if claims.sub != from && claims.sub != to {
        return Err(StatusCode::FORBIDDEN);
    }
    let exists = blocking(&state, move |db| db.like_exists(from, to)).await?;
    Ok(Json(ExistsResponse { exists }))
}

pub async fn create_pass(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<TargetRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let (user, target) = (claims.sub, req.target_id);
    if user == target {
        return Err(StatusCode::BAD_REQUEST);
    }
    blocking(&state, move |db| db.insert_pass(user, target, Utc::now())).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_block(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<TargetRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let (user, target) = (claims.sub, req.target_id);
    if user == target {
        return Err(StatusCode::BAD_REQUEST);
    }
    if blocking(&state, move |db| db.insert_block(user, target, Utc::now())).await? {
        info!("{} blocked {}", user, target);
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn block_exists(
    State(state): State<AppState>,
    Path((a, b)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    if claims.sub != a && claims.sub != b {
        return Err(StatusCode::FORBIDDEN);
    }
    let exists = blocking(&state, move |db| db.is_blocked(a, b)).await?;
    Ok(Json(ExistsResponse { exists }))
}

pub async fn discovery_exclusions(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    ensure_self(&claims, user_id)?;
    let ids = blocking(&state, move |db| {
        db.discovery_exclusions(user_id)?
            .iter()
            .map(|id| id.parse::<Uuid>().map_err(anyhow::Error::from))
            .collect::<anyhow::Result<Vec<_>>>()
    })
    .await?;
    Ok(Json(ids))
}
